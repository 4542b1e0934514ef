//! SSH transport.
//!
//! libssh2 is blocking, so every session call runs under `spawn_blocking`.
//! Streams are pumped between the blocking channel and the async side in
//! fixed-size chunks over a bounded queue.

use async_trait::async_trait;
use bbr_core::remote::{CommandOutput, RemoteRunner};
use bbr_core::{Error, Result};
use bytes::Bytes;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

const STREAM_CHUNK_SIZE: usize = 64 * 1024;
const STREAM_QUEUE_DEPTH: usize = 16;

pub struct SshRunner {
    host: String,

    /// `None` once closed
    session: Arc<Mutex<Option<ssh2::Session>>>,
}

fn ssh_error(host: &str, e: impl std::fmt::Display) -> Error {
    Error::Remote(format!("ssh {}: {}", host, e))
}

fn open_session(address: &str, username: &str, private_key: &Path) -> Result<ssh2::Session> {
    let tcp = TcpStream::connect(address).map_err(|e| ssh_error(address, e))?;
    let mut session = ssh2::Session::new().map_err(|e| ssh_error(address, e))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| ssh_error(address, e))?;

    session
        .userauth_pubkey_file(username, None, private_key, None)
        .map_err(|e| ssh_error(address, format!("authentication as {} failed: {}", username, e)))?;
    if !session.authenticated() {
        return Err(ssh_error(address, "authentication failed"));
    }
    Ok(session)
}

fn open_exec(session: &ssh2::Session, host: &str, cmd: &str) -> Result<ssh2::Channel> {
    let mut channel = session.channel_session().map_err(|e| ssh_error(host, e))?;
    channel.exec(cmd).map_err(|e| ssh_error(host, e))?;
    Ok(channel)
}

/// Drain stderr and collect the exit status of a channel whose stdout has
/// been consumed.
fn finish(mut channel: ssh2::Channel, host: &str, stdout: Vec<u8>) -> Result<CommandOutput> {
    let mut stderr = Vec::new();
    channel.stderr().read_to_end(&mut stderr)?;
    channel.wait_close().map_err(|e| ssh_error(host, e))?;
    let status = channel.exit_status().map_err(|e| ssh_error(host, e))?;
    Ok(CommandOutput {
        stdout,
        stderr,
        status,
    })
}

fn exec(session: &ssh2::Session, host: &str, cmd: &str) -> Result<CommandOutput> {
    let mut channel = open_exec(session, host, cmd)?;
    let mut stdout = Vec::new();
    channel.read_to_end(&mut stdout)?;
    finish(channel, host, stdout)
}

fn check_status(host: &str, cmd: &str, output: &CommandOutput) -> Result<()> {
    if output.success() {
        return Ok(());
    }
    Err(Error::Remote(format!(
        "'{}' on {} exited {}: {}",
        cmd,
        host,
        output.status,
        output.stderr_str().trim()
    )))
}

impl SshRunner {
    /// Open an authenticated session using a private key file.
    pub async fn connect(host: &str, port: u16, username: &str, private_key: &Path) -> Result<Self> {
        let address = format!("{}:{}", host, port);
        info!(host = %address, username, "Connecting");

        let session = tokio::task::spawn_blocking({
            let address = address.clone();
            let username = username.to_string();
            let private_key = private_key.to_path_buf();
            move || open_session(&address, &username, &private_key)
        })
        .await??;

        Ok(Self {
            host: address,
            session: Arc::new(Mutex::new(Some(session))),
        })
    }

    fn session(&self) -> Result<ssh2::Session> {
        let guard = self
            .session
            .lock()
            .map_err(|_| ssh_error(&self.host, "session lock poisoned"))?;
        guard
            .clone()
            .ok_or_else(|| ssh_error(&self.host, "connection already closed"))
    }
}

#[async_trait]
impl RemoteRunner for SshRunner {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, cmd: &str) -> Result<CommandOutput> {
        debug!(host = %self.host, "Running {}", cmd);
        let session = self.session()?;
        let host = self.host.clone();
        let cmd = cmd.to_string();
        tokio::task::spawn_blocking(move || exec(&session, &host, &cmd)).await?
    }

    async fn stream_out(
        &self,
        cmd: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        debug!(host = %self.host, "Streaming from {}", cmd);
        let session = self.session()?;
        let (tx, mut rx) = mpsc::channel::<Bytes>(STREAM_QUEUE_DEPTH);

        let pump = tokio::task::spawn_blocking({
            let host = self.host.clone();
            let cmd = cmd.to_string();
            move || -> Result<CommandOutput> {
                let mut channel = open_exec(&session, &host, &cmd)?;
                let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
                loop {
                    let n = channel.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        let _ = channel.close();
                        return Err(ssh_error(&host, "local writer went away mid-stream"));
                    }
                }
                finish(channel, &host, Vec::new())
            }
        });

        while let Some(chunk) = rx.recv().await {
            writer.write_all(&chunk).await?;
        }
        let output = pump.await??;
        check_status(&self.host, cmd, &output)
    }

    async fn stream_in(&self, cmd: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        debug!(host = %self.host, "Streaming into {}", cmd);
        let session = self.session()?;
        let (tx, mut rx) = mpsc::channel::<Bytes>(STREAM_QUEUE_DEPTH);

        let pump = tokio::task::spawn_blocking({
            let host = self.host.clone();
            let cmd = cmd.to_string();
            move || -> Result<CommandOutput> {
                let mut channel = open_exec(&session, &host, &cmd)?;
                while let Some(chunk) = rx.blocking_recv() {
                    channel.write_all(&chunk)?;
                }
                channel.send_eof().map_err(|e| ssh_error(&host, e))?;
                finish(channel, &host, Vec::new())
            }
        });

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                break;
            }
        }
        drop(tx);

        let output = pump.await??;
        check_status(&self.host, cmd, &output)
    }

    async fn close(&self) -> Result<()> {
        let session = {
            let mut guard = self
                .session
                .lock()
                .map_err(|_| ssh_error(&self.host, "session lock poisoned"))?;
            guard.take()
        };
        let Some(session) = session else {
            return Ok(());
        };

        debug!(host = %self.host, "Disconnecting");
        let host = self.host.clone();
        tokio::task::spawn_blocking(move || {
            session
                .disconnect(None, "bbr finished", None)
                .map_err(|e| ssh_error(&host, e))
        })
        .await?
    }
}

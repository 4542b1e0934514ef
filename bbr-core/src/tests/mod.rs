mod cleanup;
mod helpers;

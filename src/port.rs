//! Stdio port: the storage worker behind stdin/stdout.
//!
//! Communicates via length-prefixed bincode frames:
//!   [4-byte big-endian length][bincode(Envelope)]   in
//!   [4-byte big-endian length][bincode(Outbound)]   out
//!
//! The first outbound frame is the lifecycle signal; after that, one
//! response frame per request frame, in order.

use anyhow::{Context, Result};
use std::io::{self, Read, Write};
use tracing::info;

use crate::protocol::{Envelope, Outbound};
use crate::vfs::Storage;
use crate::worker::Worker;

// ── Frame I/O ─────────────────────────────────────────────────────────

pub fn read_frame(r: &mut impl Read) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .context("reading frame body")?;
    Ok(Some(buf))
}

pub fn write_frame(w: &mut impl Write, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .context("frame too large")?
        .to_be_bytes();
    w.write_all(&len)?;
    w.write_all(data)?;
    w.flush()?;
    Ok(())
}

fn send(w: &mut impl Write, message: &Outbound) -> Result<()> {
    let bytes = bincode::serialize(message).context("encoding outbound frame")?;
    write_frame(w, &bytes)
}

// ── Serve loop ────────────────────────────────────────────────────────

/// Boot `worker`, announce, then answer frames until `input` hits EOF.
pub fn serve<S: Storage>(mut worker: Worker<S>, input: &mut impl Read, output: &mut impl Write) -> Result<()> {
    let signal = worker.boot();
    send(output, &Outbound::Signal(signal))?;

    loop {
        let frame = match read_frame(input)? {
            Some(f) => f,
            None => {
                info!("stdin closed, shutting down");
                break;
            }
        };

        let envelope: Envelope =
            bincode::deserialize(&frame).context("decoding request frame")?;
        let response = worker.handle(envelope);
        send(output, &Outbound::Response(response))?;
    }

    Ok(())
}

/// `serve` over the process's stdin/stdout.
pub fn serve_stdio<S: Storage>(worker: Worker<S>) -> Result<()> {
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    serve(worker, &mut stdin, &mut stdout)
}

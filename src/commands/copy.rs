//! Implementation of the `jointfile copy` command.
//!
//! Streams the source into the destination through a write handle. With
//! `--tail`, a second thread (its own owner) joins the destination while the
//! copy is in flight and echoes what the writer has flushed so far, blocking
//! for the rest until the writer closes.

use super::require_existing;
use crate::cli::CopyArgs;
use jointfile::{JoinMode, JoinableFileManager, JointError, ManagerConfig, OwnerContext, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

pub fn cmd_copy(mut config: ManagerConfig, args: CopyArgs) -> Result<()> {
    if let Some(mode) = &args.join_mode {
        config.join_mode = JoinMode::from_str(mode).ok_or_else(|| {
            JointError::Config(format!(
                "invalid join mode '{}' (expected from_start or from_current)",
                mode
            ))
        })?;
    }
    let mgr = JoinableFileManager::with_config(config);
    require_existing(&mgr, &args.src)?;
    let ctx = OwnerContext::with_label("copy");
    let timeout = args
        .timeout_ms
        .map(jointfile::Timeout::from_millis)
        .unwrap_or_else(|| mgr.config().default_timeout());

    let Some(mut input) = mgr.open_input_stream_with_timeout(&ctx, &args.src, timeout)? else {
        return Err(JointError::Busy(format!(
            "no reader slot free for '{}'",
            args.src.display()
        )));
    };
    let Some(mut output) = mgr.open_output_stream_with_timeout(&ctx, &args.dst, timeout)? else {
        return Err(JointError::Busy(format!(
            "'{}' is locked or being written by another owner",
            args.dst.display()
        )));
    };

    let tail = args.tail.then(|| spawn_tail(mgr.clone(), args.dst.clone()));

    let copied = io::copy(&mut input, &mut output).map_err(|e| JointError::io(&args.dst, e))?;
    let snapshot = args.stats.then(|| mgr.registry().snapshot());
    output.close()?;
    input.close()?;

    if let Some(tail) = tail {
        let echoed = tail
            .join()
            .map_err(|_| JointError::Invariant("tail reader panicked".to_string()))??;
        debug!(bytes = echoed, "tail reader finished");
    }

    if let Some(snapshot) = snapshot {
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| JointError::Invariant(format!("registry snapshot not serializable: {e}")))?;
        println!("{json}");
    }

    mgr.cleanup_current_context(&ctx)?;
    info!(
        src = %args.src.display(),
        dst = %args.dst.display(),
        bytes = copied,
        "copy finished"
    );
    Ok(())
}

/// Join the destination from another thread and echo it to stdout.
///
/// Returns once the reader has opened, so the copy starts with the reader
/// already attached.
fn spawn_tail(mgr: JoinableFileManager, path: PathBuf) -> JoinHandle<Result<u64>> {
    let opened = Arc::new(Barrier::new(2));
    let handle = {
        let opened = opened.clone();
        thread::spawn(move || {
            let ctx = OwnerContext::with_label("tail");
            let input = mgr.open_input_stream(&ctx, &path);
            opened.wait();

            let Some(mut input) = input? else {
                return Err(JointError::Busy(format!(
                    "no reader slot free for '{}'",
                    path.display()
                )));
            };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let echoed = io::copy(&mut input, &mut out).map_err(|e| JointError::io(&path, e))?;
            out.flush().map_err(|e| JointError::io("<stdout>", e))?;
            input.close()?;
            mgr.cleanup_current_context(&ctx)?;
            Ok(echoed)
        })
    };
    opened.wait();
    handle
}

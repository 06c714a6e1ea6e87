//! Implementation of the `jointfile cat` command.

use super::require_existing;
use crate::cli::CatArgs;
use jointfile::{JoinableFileManager, JointError, OwnerContext, Result};
use std::io::{self, Write};
use tracing::debug;

/// Copy a file to stdout through an input stream.
pub fn cmd_cat(mgr: &JoinableFileManager, args: CatArgs) -> Result<()> {
    require_existing(mgr, &args.path)?;
    let ctx = OwnerContext::with_label("cat");

    let Some(mut input) = mgr.open_input_stream(&ctx, &args.path)? else {
        return Err(JointError::Busy(format!(
            "no reader slot free for '{}'",
            args.path.display()
        )));
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let copied = io::copy(&mut input, &mut out).map_err(|e| JointError::io(&args.path, e))?;
    out.flush().map_err(|e| JointError::io("<stdout>", e))?;
    input.close()?;

    debug!(path = %args.path.display(), bytes = copied, "cat finished");
    mgr.cleanup_current_context(&ctx)?;
    Ok(())
}

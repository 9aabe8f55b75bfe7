//! External-solver pre-solve: the model is written as MPS to a temp file,
//! the configured command is run on it, and the resulting solution file is
//! parsed back. Recognized variables get their bounds fixed in the model so
//! the subsequent in-process solve confirms the objective.

use super::hardware_threads;
use crate::error::OptimError;
use crate::ilp::model::MipModel;
use log::{info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::Command;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PreSolveOutcome {
    /// False when the command exited nonzero; the model is left untouched
    /// and the caller falls through to a plain in-process solve.
    pub ok: bool,
    /// Number of variables whose bounds were fixed.
    pub fixed: usize,
    /// Wall time of the external command.
    pub duration: Duration,
}

/// Run `command` (a template with `{INPUT}`, `{OUTPUT}` and `{THREADS}`
/// placeholders) on the model. I/O failures around the temp files are fatal;
/// a nonzero exit of the command itself is not.
pub fn pre_solve(model: &mut MipModel, command: &str) -> Result<PreSolveOutcome, OptimError> {
    let mps = tempfile::Builder::new()
        .prefix("speedwell")
        .suffix(".mps")
        .tempfile()?;
    let sol = tempfile::Builder::new()
        .prefix("speedwell")
        .suffix(".sol")
        .tempfile()?;

    model.write_mps_to_path(mps.path())?;

    let cmd = command
        .replace("{INPUT}", &mps.path().to_string_lossy())
        .replace("{OUTPUT}", &sol.path().to_string_lossy())
        .replace("{THREADS}", &hardware_threads().to_string());

    info!("calling external solver: '{}'", cmd);

    let started = Instant::now();
    let status = Command::new("sh").arg("-c").arg(&cmd).status();
    let duration = started.elapsed();

    let ok = match status {
        Ok(s) if s.success() => true,
        Ok(s) => {
            warn!("external solver exited with {}, ignoring its result", s);
            false
        }
        Err(e) => {
            warn!("could not invoke external solver: {}, ignoring", e);
            false
        }
    };

    if !ok {
        return Ok(PreSolveOutcome {
            ok: false,
            fixed: 0,
            duration,
        });
    }

    info!(
        "external solve done in {} ms, parsing solution",
        duration.as_millis()
    );

    let fixed = parse_and_fix(model, BufReader::new(File::open(sol.path())?))?;
    info!("fixed {} variables from external solution", fixed);

    Ok(PreSolveOutcome {
        ok: true,
        fixed,
        duration,
    })
}

/// Parse a solution file: the first line is a header and skipped; every
/// other line is `[<index>] <name> <value>` with a tolerated missing index.
/// Values are rounded toward zero. Unparseable lines and unknown names are
/// skipped.
fn parse_and_fix<R: BufRead>(model: &mut MipModel, reader: R) -> Result<usize, OptimError> {
    let mut fixed = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if i == 0 {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let first = match tokens.next() {
            Some(t) => t,
            None => continue,
        };
        // leading line number is optional
        let name = if first.parse::<i64>().is_ok() {
            match tokens.next() {
                Some(t) => t,
                None => continue,
            }
        } else {
            first
        };
        let value = match tokens.next().and_then(|t| t.parse::<f64>().ok()) {
            Some(v) => v,
            None => continue,
        };
        if model.fix_col(name, value as i64) {
            fixed += 1;
        }
    }
    Ok(fixed)
}

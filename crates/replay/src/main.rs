use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};

use hotpath_core::{ManualClock, Profiler};
use hotpath_protocol::{DebugInfo, HookEvent};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: hotpath-replay <trace.ndjson> [--out report.json]");
        std::process::exit(1);
    }
    let trace = PathBuf::from(&args[1]);
    let out = args
        .iter()
        .position(|arg| arg == "--out")
        .and_then(|index| args.get(index + 1))
        .map(PathBuf::from);

    let clock = ManualClock::new();
    let mut profiler = Profiler::with_clock(clock.clone());
    profiler.start()?;

    let file = File::open(&trace).with_context(|| format!("cannot open trace {}", trace.display()))?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: HookEvent = serde_json::from_str(&line)
            .with_context(|| format!("malformed event on line {}", index + 1))?;
        apply(&mut profiler, &clock, event)
            .with_context(|| format!("replay failed on line {}", index + 1))?;
    }

    match out {
        Some(path) => profiler.dump(&path, None)?,
        None => profiler.write_report(io::stdout().lock(), None)?,
    }
    Ok(())
}

fn apply(profiler: &mut Profiler<ManualClock>, clock: &ManualClock, event: HookEvent) -> Result<()> {
    match event {
        HookEvent::DeclareContext { context } => profiler.declare_context(context)?,
        HookEvent::Call {
            context,
            key,
            kind,
            info,
            at,
        } => {
            clock.set(at);
            profiler.on_call(context, key, kind, move || {
                info.unwrap_or_else(DebugInfo::unknown)
            })?;
        }
        HookEvent::Return { context, key, at } => {
            clock.set(at);
            profiler.on_return(context, key)?;
        }
        HookEvent::SaveSnapshot => {
            profiler.save_snapshot()?;
        }
    }
    Ok(())
}

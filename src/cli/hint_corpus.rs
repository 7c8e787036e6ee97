use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::Colorize;

use cmphints::{HintsLimiter, HintsOpts};

#[derive(Parser)]
pub(crate) struct HintCorpusOpts {
    /// Directory of `<name>.json` programs, each next to a `<name>.trace`.
    pub dir: PathBuf,
    #[clap(long)]
    cores: Option<usize>,
    /// Only hint this call of every program.
    #[clap(long)]
    call: Option<usize>,
    #[clap(flatten)]
    h: HintsOpts,
}

#[derive(Debug, Default)]
struct Stats {
    calls: usize,
    pairs: usize,
    dropped: usize,
    candidates: usize,
}

struct Report {
    path: PathBuf,
    res: Result<Stats>,
}

fn find_trace(program: &Path) -> Option<PathBuf> {
    ["trace", "trace.json", "trace.zst"]
        .into_iter()
        .map(|ext| program.with_extension(ext))
        .find(|path| path.exists())
}

fn hint_program(
    path: &Path,
    call: Option<usize>,
    opts: &HintsOpts,
    limiter: &HintsLimiter,
) -> Result<Stats> {
    let prog = super::load_program(path)?;
    let trace_path = find_trace(path).ok_or_else(|| anyhow!("no trace next to {path:?}"))?;
    let trace = super::load_trace(&trace_path)?;

    let calls = match call {
        Some(call) if call < prog.calls.len() => call..call + 1,
        Some(_) => 0..0,
        None => 0..prog.calls.len(),
    };
    let mut stats = Stats::default();
    for call in calls {
        let mut comps = trace.comps(call);
        stats.calls += 1;
        stats.pairs += comps.len();
        stats.dropped += limiter.limit(&mut comps);
        prog.mutate_with_hints(call, &comps, opts, |_| {
            stats.candidates += 1;
            true
        });
    }
    Ok(stats)
}

fn gather_programs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut res = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to list {dir:?}"))? {
        let path = entry?.path();
        let name = path.to_string_lossy();
        if name.ends_with(".json") && !name.ends_with(".trace.json") {
            res.push(path);
        }
    }
    res.sort();
    Ok(res)
}

pub(crate) fn run(opts: HintCorpusOpts) -> Result<()> {
    let HintCorpusOpts {
        dir,
        cores,
        call,
        h,
    } = opts;
    let cores = cores.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let start = Instant::now();

    let programs = gather_programs(&dir)?;
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<PathBuf>();
    let (report_tx, report_rx) = crossbeam_channel::unbounded::<Report>();
    for path in &programs {
        job_tx.send(path.clone())?;
    }
    drop(job_tx);

    let limiter = Arc::new(HintsLimiter::new(h.max_hints_per_pc));
    let h = Arc::new(h);
    let mut handles = Vec::new();
    for core_idx in 0..cores {
        let job_rx = job_rx.clone();
        let report_tx = report_tx.clone();
        let limiter = limiter.clone();
        let h = h.clone();
        let handle = std::thread::Builder::new()
            .name(format!("worker-{core_idx}"))
            .spawn(move || {
                while let Ok(path) = job_rx.recv() {
                    let res = hint_program(&path, call, &h, &limiter);
                    if report_tx.send(Report { path, res }).is_err() {
                        break;
                    }
                }
            })
            .context("failed to spawn worker")?;
        handles.push(handle);
    }
    drop(report_tx);

    let mut total = Stats::default();
    let mut failed = 0usize;
    for Report { path, res } in report_rx {
        match res {
            Ok(stats) => {
                if h.verbose {
                    println!(
                        "{path:?}: {} calls, {} pairs, {} limited, {} candidates",
                        stats.calls, stats.pairs, stats.dropped, stats.candidates
                    );
                }
                total.calls += stats.calls;
                total.pairs += stats.pairs;
                total.dropped += stats.dropped;
                total.candidates += stats.candidates;
            }
            Err(err) => {
                failed += 1;
                eprintln!("{} {path:?}: {err:#}", "[WARN]".yellow());
            }
        }
    }
    for handle in handles {
        handle.join().map_err(|_| anyhow!("worker thread died"))?;
    }

    println!(
        "{} {} programs ({} failed), {} calls, {} pairs, {} limited, {} candidates in {:?}",
        "done:".green().bold(),
        programs.len(),
        failed,
        total.calls,
        total.pairs,
        total.dropped,
        total.candidates,
        start.elapsed()
    );
    Ok(())
}

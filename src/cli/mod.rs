use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use speedy::Readable;

use cmphints::{
    Call, CompMap, ExecTrace, HintsLimiter, HintsOpts, Program,
    prog::{Arg, DataArg},
};

mod hint_corpus;

#[derive(Parser)]
pub(crate) struct Opts {
    #[clap(subcommand)]
    subcmd: Subcommand,
}

#[derive(Parser)]
pub(crate) enum Subcommand {
    /// Print every program the comparison hints derive from one call.
    Mutate {
        program: PathBuf,
        /// Execution traces of the program. Pairs missing from any of them
        /// are considered unstable and ignored.
        #[clap(required = true)]
        traces: Vec<PathBuf>,
        #[clap(long, default_value = "0")]
        call: usize,
        /// Apply a fresh per-PC limiter before generating hints.
        #[clap(long)]
        limit: bool,
        /// Hexdump mutated buffers.
        #[clap(long)]
        hexdump: bool,
        #[clap(flatten)]
        h: HintsOpts,
    },
    /// Summarize the comparisons recorded in a trace.
    TraceInfo {
        trace: PathBuf,
        #[clap(long, default_value = "20")]
        top: usize,
    },
    /// Generate hints for every program/trace pair in a directory.
    HintCorpus(hint_corpus::HintCorpusOpts),
}

pub(crate) fn load_program(path: &Path) -> Result<Program> {
    let (data, _) = crate::util::read_maybe_compressed(path)?;
    let prog: Program =
        serde_json::from_slice(&data).with_context(|| format!("failed to parse {path:?}"))?;
    prog.validate()
        .with_context(|| format!("inconsistent program {path:?}"))?;
    Ok(prog)
}

/// `.json` traces are parsed as JSON, everything else as a speedy stream.
pub(crate) fn load_trace(path: &Path) -> Result<ExecTrace> {
    let (data, name) = crate::util::read_maybe_compressed(path)?;
    let trace: ExecTrace = if name.ends_with(".json") {
        serde_json::from_slice(&data).with_context(|| format!("failed to parse {path:?}"))?
    } else {
        ExecTrace::read_from_buffer(&data)
            .with_context(|| format!("failed to decode {path:?}"))?
    };
    Ok(trace)
}

/// Buffers of `cand` that differ from the same argument in `orig`.
fn changed_buffers<'a>(orig: &Call, cand: &'a Call) -> Vec<&'a DataArg> {
    let mut res = Vec::new();
    orig.foreach_arg(|arg, path| {
        if let (Arg::Data(old), Some(Arg::Data(new))) = (arg, cand.arg(path)) {
            if old.data != new.data {
                res.push(new);
            }
        }
        true
    });
    res
}

fn mutate(
    program: &Path,
    traces: &[PathBuf],
    call: usize,
    limit: bool,
    hexdump: bool,
    opts: &HintsOpts,
) -> Result<()> {
    let prog = load_program(program)?;
    if call >= prog.calls.len() {
        bail!(
            "call index {call} out of range, {program:?} has {} calls",
            prog.calls.len()
        );
    }

    let mut comps: Option<CompMap> = None;
    for path in traces {
        let other = load_trace(path)?.comps(call);
        match comps.as_mut() {
            Some(comps) => comps.inplace_intersect(&other),
            None => comps = Some(other),
        }
    }
    let mut comps = comps.unwrap_or_default();
    if opts.verbose {
        eprintln!("[INFO] {} stable comparison pairs", comps.len());
    }
    if limit {
        let dropped = HintsLimiter::new(opts.max_hints_per_pc).limit(&mut comps);
        if opts.verbose {
            eprintln!("[INFO] limiter dropped {dropped} entries");
        }
    }

    println!("{} {}", "source:".bold(), prog.calls[call]);
    let mut count = 0usize;
    let mut io_err = None;
    prog.mutate_with_hints(call, &comps, opts, |cand| {
        count += 1;
        println!("{} {}", format!("#{count}").green(), cand.calls[call]);
        if hexdump {
            for buf in changed_buffers(&prog.calls[call], &cand.calls[call]) {
                if let Err(err) = crate::util::print_hexdump(&buf.data) {
                    io_err = Some(err);
                    return false;
                }
            }
        }
        true
    });
    if let Some(err) = io_err {
        return Err(err).context("failed to write hexdump");
    }
    println!("{count} candidates");
    Ok(())
}

fn trace_info(path: &Path, top: usize) -> Result<()> {
    let trace = load_trace(path)?;
    println!("{} {path:?}: {} calls", "trace".bold(), trace.calls.len());
    for (i, records) in trace.calls.iter().enumerate() {
        let comps = trace.comps(i);
        let mut per_pc: Vec<(u64, usize)> = comps.per_pc_count().into_iter().collect();
        per_pc.sort_by_key(|&(pc, count)| (std::cmp::Reverse(count), pc));
        let unassignable = records.iter().filter(|rec| !rec.assignable).count();
        println!(
            "call #{i}: {} records, {} pairs, {} PCs ({} non-assignable records)",
            records.len(),
            comps.len(),
            per_pc.len(),
            unassignable
        );
        for (pc, count) in per_pc.into_iter().take(top) {
            let pc = format!("{pc:#x}");
            println!("  {:>18} {count}", pc.cyan());
        }
    }
    Ok(())
}

pub(crate) fn main() {
    let opts: Opts = Opts::parse();

    let res = match opts.subcmd {
        Subcommand::Mutate {
            program,
            traces,
            call,
            limit,
            hexdump,
            h,
        } => mutate(&program, &traces, call, limit, hexdump, &h),
        Subcommand::TraceInfo { trace, top } => trace_info(&trace, top),
        Subcommand::HintCorpus(opts) => hint_corpus::run(opts),
    };
    if let Err(err) = res {
        eprintln!("{} {err:#}", "[ERROR]".red());
        std::process::exit(1);
    }
}

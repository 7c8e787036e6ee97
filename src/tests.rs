use crate::{
    comps::{CmpRecord, CompMap, ExecTrace},
    hints::{HintsLimiter, HintsOpts, leaf_paths},
    prog::{Arg, BufferKind, Call, ConstArg, ConstKind, DataArg, Dir, PointerArg, Program},
};
use clap::Parser;
use rand::{Rng, SeedableRng, rngs::StdRng};

struct Hints {
    opts: HintsOpts,
}

impl Hints {
    fn with_config<F: FnOnce(&mut HintsOpts)>(f: F) -> Self {
        let mut opts = HintsOpts::parse_from(vec!["cmphints"]);
        opts.verbose = true;
        f(&mut opts);
        Self { opts }
    }

    fn candidates(&self, prog: &Program, call: usize, comps: &CompMap) -> Vec<Program> {
        let source = prog.clone();
        let mut res = Vec::new();
        let completed = prog.mutate_with_hints(call, comps, &self.opts, |p| {
            res.push(p);
            true
        });
        assert!(completed);
        assert_eq!(prog, &source, "source program got mutated");
        res
    }

    fn assert_candidates(
        &self,
        prog: &Program,
        call: usize,
        comps: &CompMap,
        want: &[&str],
    ) -> &Self {
        let res: Vec<String> = self
            .candidates(prog, call, comps)
            .iter()
            .map(|p| p.calls[call].to_string())
            .collect();
        assert_eq!(res, want);
        self
    }
}

fn single_call(name: &str, args: Vec<Arg>) -> Program {
    Program::new(vec![Call::new(name, args)])
}

fn comps(entries: &[(u64, &[u64])]) -> CompMap {
    let mut res = CompMap::new();
    for &(observed, vals) in entries {
        for &val in vals {
            res.insert(0x1000, observed, val, true);
        }
    }
    res
}

#[test]
fn test_int_arg() {
    Hints::with_config(|_| {}).assert_candidates(
        &single_call("test$hint_int", vec![Arg::int(4, 0xdeadbeef)]),
        0,
        &comps(&[(0xdeadbeef, &[0xcafebabe])]),
        &["test$hint_int(0xcafebabe)"],
    );
}

#[test]
fn test_nested_data_arg() {
    Hints::with_config(|_| {}).assert_candidates(
        &single_call(
            "test$hint_data",
            vec![Arg::ptr(Arg::blob(b"\x08\x09\x10\x11\x12\x13\x14\x15"))],
        ),
        0,
        &comps(&[(0x12111009, &[0x42])]),
        &["test$hint_data(&\"0842000000131415\")"],
    );
}

#[test]
fn test_group_args_in_order() {
    let prog = single_call(
        "test$struct",
        vec![Arg::ptr(Arg::group(vec![
            Arg::int(2, 0xabcd),
            Arg::compressed(b"\x00\x11\x22\x33\x44\x55\x66\x77"),
            Arg::int(8, 0x1234),
        ]))],
    );
    Hints::with_config(|_| {}).assert_candidates(
        &prog,
        0,
        &comps(&[
            (0xabcd, &[0x4444]),
            (0x33221100, &[0xaabbccdd]),
            (0x1234, &[0x5555]),
        ]),
        &[
            "test$struct(&{0x4444, \"0011223344556677\", 0x1234})",
            "test$struct(&{0xabcd, \"ddccbbaa44556677\", 0x1234})",
            "test$struct(&{0xabcd, \"0011223344556677\", 0x5555})",
        ],
    );
}

#[test]
fn test_leaf_paths() {
    let call = Call::new(
        "test$paths",
        vec![
            Arg::int(4, 0x10),
            Arg::ptr(Arg::group(vec![
                Arg::int(2, 0x20),
                Arg::ptr(Arg::blob(b"\x01\x02\x03\x04")),
                Arg::group(vec![]),
            ])),
            Arg::Pointer(PointerArg {
                dir: Dir::In,
                res: None,
            }),
        ],
    );
    let paths: Vec<Vec<usize>> = vec![vec![0], vec![1, 0, 0], vec![1, 0, 1, 0]];
    assert_eq!(leaf_paths(&call), paths);
}

#[test]
fn test_only_hinted_call_changes() {
    let prog = Program::new(vec![
        Call::new("first", vec![Arg::int(4, 0x1234)]),
        Call::new("second", vec![Arg::int(4, 0x1234)]),
    ]);
    let hints = Hints::with_config(|_| {});
    let res = hints.candidates(&prog, 1, &comps(&[(0x1234, &[0x4321])]));
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].calls[0], prog.calls[0]);
    assert_eq!(res[0].calls[1].to_string(), "second(0x4321)");
}

#[test]
fn test_skipped_args() {
    let proc_arg = ConstArg {
        kind: ConstKind::Proc,
        ..ConstArg::new(4, 0x1234)
    };
    let filename = DataArg::new(BufferKind::Filename, b"./file0\x00".to_vec());
    let fixed_string = DataArg::new(
        BufferKind::String { fixed_values: true },
        b"\x34\x12\x00\x00".to_vec(),
    );
    let prog = single_call(
        "test$skipped",
        vec![
            Arg::int(4, 0x1234).with_dir(Dir::Out),
            Arg::int(1, 0x34),
            Arg::bitfield(4, 8, 0x34),
            Arg::Const(proc_arg),
            Arg::ptr(Arg::blob(b"\x34\x12\x00")),
            Arg::ptr(Arg::Data(filename)),
            Arg::ptr(Arg::Data(fixed_string)),
            Arg::ptr(Arg::blob(b"\x34\x12\x00\x00").with_dir(Dir::Out)),
        ],
    );
    let comps = comps(&[(0x1234, &[0x4321]), (0x34, &[0x43])]);
    Hints::with_config(|_| {}).assert_candidates(&prog, 0, &comps, &[]);

    // only the size filters are knobs
    let res = Hints::with_config(|opts| {
        opts.min_int_bits = 0;
        opts.min_data_len = 0;
    })
    .candidates(&prog, 0, &comps);
    let res: Vec<String> = res.iter().map(|p| p.calls[0].to_string()).collect();
    assert!(res.iter().any(|c| c.contains("0x43, 0x34")));
    assert!(res.iter().any(|c| c.contains("0x34, 0x43")));
    assert!(res.iter().any(|c| c.contains("&\"214300\"")));
    assert!(res.iter().all(|c| c.starts_with("test$skipped(0x1234, ")));
}

#[test]
fn test_invalid_candidates_dropped() {
    let mut fixed = DataArg::new(BufferKind::Blob, b"\x01\x02".to_vec());
    fixed.size = Some(4);
    let prog = single_call(
        "test$invalid",
        vec![Arg::int(4, 0xdeadbeef), Arg::ptr(Arg::Data(fixed))],
    );
    assert!(prog.validate().is_err());
    Hints::with_config(|_| {}).assert_candidates(
        &prog,
        0,
        &comps(&[(0xdeadbeef, &[0xcafebabe])]),
        &[],
    );
}

#[test]
fn test_stop() {
    let prog = single_call(
        "test$stop",
        vec![Arg::int(4, 0x1234), Arg::int(4, 0x1234)],
    );
    let comps = comps(&[(0x1234, &[0x4321, 0x5678])]);
    let mut calls = 0;
    let completed = prog.mutate_with_hints(0, &comps, &HintsOpts::default(), |_| {
        calls += 1;
        calls < 3
    });
    assert!(!completed);
    assert_eq!(calls, 3);
}

#[test]
#[should_panic]
fn test_call_index_out_of_range() {
    let prog = single_call("test$oob", vec![Arg::int(4, 0x1234)]);
    prog.mutate_with_hints(1, &CompMap::new(), &HintsOpts::default(), |_| true);
}

#[test]
fn test_trace_and_limiter() {
    let record = |pc, observed, replacement| CmpRecord {
        pc,
        observed,
        replacement,
        assignable: true,
    };
    let mut trace = ExecTrace {
        calls: vec![vec![], vec![]],
    };
    for i in 0..12 {
        trace.calls[1].push(record(0x2000, 0x1234, 0x5000 + i));
    }
    trace.calls[1].push(CmpRecord {
        assignable: false,
        ..record(0x3000, 0x1234, 0x7777)
    });
    let json = serde_json::to_string(&trace).unwrap();
    let trace: ExecTrace = serde_json::from_str(&json).unwrap();

    let prog = Program::new(vec![
        Call::new("first", vec![]),
        Call::new("second", vec![Arg::int(4, 0x1234)]),
    ]);
    let mut comps = trace.comps(1);
    assert!(trace.comps(0).is_empty());
    assert!(trace.comps(5).is_empty());

    let limiter = HintsLimiter::new(10);
    assert_eq!(limiter.limit(&mut comps), 2);
    let res = Hints::with_config(|_| {}).candidates(&prog, 1, &comps);
    let res: Vec<String> = res.iter().map(|p| p.calls[1].to_string()).collect();
    let want: Vec<String> = (0..10).map(|i| format!("second({:#x})", 0x5000 + i)).collect();
    assert_eq!(res, want);
}

fn random_arg(rng: &mut StdRng, depth: u32) -> Arg {
    let dir = match rng.random_range(0..6) {
        0 => Dir::Out,
        1 => Dir::InOut,
        _ => Dir::In,
    };
    let arg = match rng.random_range(0..if depth > 2 { 2 } else { 4 }) {
        0 => {
            let size = [1, 2, 4, 8][rng.random_range(0..4)];
            let bits = if rng.random_bool(0.2) {
                rng.random_range(1..=size * 8)
            } else {
                size * 8
            };
            let val = if bits == 64 {
                rng.random::<u64>()
            } else {
                rng.random::<u64>() & ((1 << bits) - 1)
            };
            let bitfield_len = if bits == size * 8 { 0 } else { bits };
            Arg::bitfield(size, bitfield_len, val)
        }
        1 => {
            let len = rng.random_range(0..24);
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            if rng.random_bool(0.3) {
                Arg::compressed(&data)
            } else {
                Arg::blob(&data)
            }
        }
        2 => Arg::ptr(random_arg(rng, depth + 1)),
        _ => {
            let len = rng.random_range(0..4);
            Arg::group((0..len).map(|_| random_arg(rng, depth + 1)).collect())
        }
    };
    arg.with_dir(dir)
}

#[test]
fn test_random_programs() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let opts = HintsOpts::default();
    for _ in 0..200 {
        let calls = (0..rng.random_range(1..4))
            .map(|i| {
                let args = (0..rng.random_range(0..5))
                    .map(|_| random_arg(&mut rng, 0))
                    .collect();
                Call::new(&format!("call{i}"), args)
            })
            .collect();
        let prog = Program::new(calls);
        prog.validate().unwrap();
        let call_index = rng.random_range(0..prog.calls.len());

        // compare every scalar and a few buffer windows against random values
        let mut comps = CompMap::new();
        prog.calls[call_index].foreach_arg(|arg, _| {
            match arg {
                Arg::Const(a) => comps.add_comparison(1, a.val, rng.random(), false),
                Arg::Data(a) if a.data.len() >= 4 => {
                    let off = rng.random_range(0..=a.data.len() - 4);
                    let window = u32::from_le_bytes(a.data[off..off + 4].try_into().unwrap());
                    comps.add_comparison(2, window as u64, rng.random::<u32>() as u64, true);
                }
                _ => {}
            }
            true
        });

        let source = prog.clone();
        let mut seen = Vec::new();
        prog.mutate_with_hints(call_index, &comps, &opts, |p| {
            p.validate().unwrap();
            assert_ne!(p, prog);
            for (i, call) in p.calls.iter().enumerate() {
                if i != call_index {
                    assert_eq!(call, &prog.calls[i]);
                }
            }
            seen.push(p);
            true
        });
        assert_eq!(prog, source);

        // generation is deterministic
        let mut again = Vec::new();
        prog.mutate_with_hints(call_index, &comps, &opts, |p| {
            again.push(p);
            true
        });
        assert_eq!(seen, again);
    }
}

//! Minimal syscall program model: calls own arguments, arguments may point
//! to or contain further arguments.

use std::fmt::{self, Display};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

mod hex_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dir {
    #[default]
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstKind {
    #[default]
    Int,
    // Per-process value, rewritten by the executor.
    Proc,
    // Computed by the executor before the call is issued.
    Csum,
    Pad,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    #[default]
    Blob,
    /// Read by the kernel as a sequence of fixed-size records (disk images
    /// and the like), substitutions must stay element aligned.
    Compressed,
    String {
        #[serde(default)]
        fixed_values: bool,
    },
    Filename,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstArg {
    #[serde(default)]
    pub dir: Dir,
    #[serde(default)]
    pub kind: ConstKind,
    /// Storage size in bytes.
    pub size: u32,
    /// Width of a bit-field, 0 if the value spans the whole storage.
    #[serde(default)]
    pub bitfield_len: u32,
    pub val: u64,
}

impl ConstArg {
    pub fn new(size: u32, val: u64) -> Self {
        Self {
            dir: Dir::In,
            kind: ConstKind::Int,
            size,
            bitfield_len: 0,
            val,
        }
    }

    pub fn bitfield(size: u32, bitfield_len: u32, val: u64) -> Self {
        Self {
            bitfield_len,
            ..Self::new(size, val)
        }
    }

    /// Effective width of the value in bits.
    pub fn bit_size(&self) -> u32 {
        assert!(
            (1..=8).contains(&self.size),
            "bad int storage size {}",
            self.size
        );
        if self.bitfield_len == 0 {
            return self.size * 8;
        }
        assert!(
            self.bitfield_len <= self.size * 8,
            "bit-field of {} bits in {} bytes",
            self.bitfield_len,
            self.size
        );
        self.bitfield_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataArg {
    #[serde(default)]
    pub dir: Dir,
    #[serde(default)]
    pub kind: BufferKind,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Required length for fixed-size buffers.
    #[serde(default)]
    pub size: Option<usize>,
}

impl DataArg {
    pub fn new(kind: BufferKind, data: Vec<u8>) -> Self {
        Self {
            dir: Dir::In,
            kind,
            data,
            size: None,
        }
    }

    pub fn is_structured(&self) -> bool {
        self.kind == BufferKind::Compressed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerArg {
    #[serde(default)]
    pub dir: Dir,
    /// Pointee, `None` for a null pointer.
    pub res: Option<Box<Arg>>,
}

/// Struct or array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupArg {
    #[serde(default)]
    pub dir: Dir,
    pub inner: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Arg {
    Const(ConstArg),
    Data(DataArg),
    Pointer(PointerArg),
    Group(GroupArg),
}

impl Arg {
    pub fn int(size: u32, val: u64) -> Self {
        Self::Const(ConstArg::new(size, val))
    }

    pub fn bitfield(size: u32, bitfield_len: u32, val: u64) -> Self {
        Self::Const(ConstArg::bitfield(size, bitfield_len, val))
    }

    pub fn blob(data: &[u8]) -> Self {
        Self::Data(DataArg::new(BufferKind::Blob, data.to_vec()))
    }

    pub fn compressed(data: &[u8]) -> Self {
        Self::Data(DataArg::new(BufferKind::Compressed, data.to_vec()))
    }

    pub fn ptr(res: Arg) -> Self {
        Self::Pointer(PointerArg {
            dir: Dir::In,
            res: Some(Box::new(res)),
        })
    }

    pub fn group(inner: Vec<Arg>) -> Self {
        Self::Group(GroupArg { dir: Dir::In, inner })
    }

    pub fn dir(&self) -> Dir {
        match self {
            Self::Const(a) => a.dir,
            Self::Data(a) => a.dir,
            Self::Pointer(a) => a.dir,
            Self::Group(a) => a.dir,
        }
    }

    pub fn with_dir(mut self, dir: Dir) -> Self {
        match &mut self {
            Self::Const(a) => a.dir = dir,
            Self::Data(a) => a.dir = dir,
            Self::Pointer(a) => a.dir = dir,
            Self::Group(a) => a.dir = dir,
        }
        self
    }

    fn child(&self, idx: usize) -> Option<&Arg> {
        match self {
            Self::Pointer(a) if idx == 0 => a.res.as_deref(),
            Self::Group(a) => a.inner.get(idx),
            _ => None,
        }
    }

    fn child_mut(&mut self, idx: usize) -> Option<&mut Arg> {
        match self {
            Self::Pointer(a) if idx == 0 => a.res.as_deref_mut(),
            Self::Group(a) => a.inner.get_mut(idx),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Const(a) => {
                ensure!((1..=8).contains(&a.size), "bad int size {}", a.size);
                ensure!(
                    a.bitfield_len <= a.size * 8,
                    "bit-field of {} bits in {} bytes",
                    a.bitfield_len,
                    a.size
                );
                let bits = if a.bitfield_len == 0 {
                    a.size * 8
                } else {
                    a.bitfield_len
                };
                if bits < 64 && a.val >> bits != 0 {
                    bail!("value {:#x} does not fit into {bits} bits", a.val);
                }
            }
            Self::Data(a) => {
                if let Some(size) = a.size {
                    ensure!(
                        a.data.len() == size,
                        "buffer of {} bytes, expected {size}",
                        a.data.len()
                    );
                }
            }
            Self::Pointer(_) | Self::Group(_) => {}
        }
        Ok(())
    }
}

/// Indices from a call's argument list down to one (possibly nested) argument.
/// A pointer's pointee is child 0.
pub type ArgPath = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

impl Call {
    pub fn new(name: &str, args: Vec<Arg>) -> Self {
        Self {
            name: name.to_owned(),
            args,
        }
    }

    /// Pre-order walk over every argument reachable from the call. Stops as
    /// soon as `f` returns false; the return value tells whether the walk
    /// ran to completion.
    pub fn foreach_arg<F: FnMut(&Arg, &[usize]) -> bool>(&self, mut f: F) -> bool {
        let mut path = Vec::new();
        for (i, arg) in self.args.iter().enumerate() {
            path.push(i);
            let more = visit_arg(arg, &mut path, &mut f);
            path.pop();
            if !more {
                return false;
            }
        }
        true
    }

    pub fn arg(&self, path: &[usize]) -> Option<&Arg> {
        let (&first, rest) = path.split_first()?;
        let mut arg = self.args.get(first)?;
        for &idx in rest {
            arg = arg.child(idx)?;
        }
        Some(arg)
    }

    pub fn arg_mut(&mut self, path: &[usize]) -> Option<&mut Arg> {
        let (&first, rest) = path.split_first()?;
        let mut arg = self.args.get_mut(first)?;
        for &idx in rest {
            arg = arg.child_mut(idx)?;
        }
        Some(arg)
    }

    pub fn validate(&self) -> Result<()> {
        let mut res: Result<()> = Ok(());
        self.foreach_arg(|arg, path| match arg.validate() {
            Ok(()) => true,
            Err(err) => {
                res = Err(err).with_context(|| format!("{}: arg {path:?}", self.name));
                false
            }
        });
        res
    }
}

fn visit_arg<F: FnMut(&Arg, &[usize]) -> bool>(
    arg: &Arg,
    path: &mut Vec<usize>,
    f: &mut F,
) -> bool {
    if !f(arg, path) {
        return false;
    }
    let children: &[Arg] = match arg {
        Arg::Pointer(PointerArg { res: Some(res), .. }) => std::slice::from_ref(res.as_ref()),
        Arg::Group(group) => &group.inner,
        _ => &[],
    };
    for (i, child) in children.iter().enumerate() {
        path.push(i);
        let more = visit_arg(child, path, f);
        path.pop();
        if !more {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Program {
    pub calls: Vec<Call>,
}

impl Program {
    pub fn new(calls: Vec<Call>) -> Self {
        Self { calls }
    }

    /// Structural consistency check of every argument.
    pub fn validate(&self) -> Result<()> {
        for call in &self.calls {
            call.validate()?;
        }
        Ok(())
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(a) => write!(f, "{:#x}", a.val),
            Self::Data(a) => write!(f, "\"{}\"", hex_bytes::encode(&a.data)),
            Self::Pointer(PointerArg { res: None, .. }) => write!(f, "0x0"),
            Self::Pointer(PointerArg { res: Some(res), .. }) => write!(f, "&{res}"),
            Self::Group(a) => {
                write!(f, "{{")?;
                for (i, inner) in a.inner.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{inner}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for call in &self.calls {
            writeln!(f, "{call}")?;
        }
        Ok(())
    }
}

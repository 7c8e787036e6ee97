use std::{io, path::Path};

use anyhow::{Context, Result};

pub(crate) fn print_hexdump(data: &[u8]) -> io::Result<()> {
    use hexyl::{BorderStyle, PrinterBuilder};
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let mut printer = PrinterBuilder::new(&mut handle)
        .show_color(true)
        .show_char_panel(true)
        .show_position_panel(true)
        .with_border_style(BorderStyle::Unicode)
        .enable_squeezing(false)
        .num_panels(2)
        .group_size(1)
        .build();
    printer.print_all(data)
}

/// Reads a file, transparently decompressing `.zst` files. Returns the
/// contents together with the file name minus the compression suffix.
pub(crate) fn read_maybe_compressed(path: &Path) -> Result<(Vec<u8>, String)> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {path:?}"))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    #[cfg(feature = "compressed_traces")]
    if let Some(stem) = name.strip_suffix(".zst") {
        let data = zstd::decode_all(data.as_slice())
            .with_context(|| format!("failed to decompress {path:?}"))?;
        return Ok((data, stem.to_owned()));
    }
    Ok((data, name))
}

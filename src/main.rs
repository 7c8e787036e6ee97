//! Command line front-end for comparison hints.

mod cli;
mod util;

#[cfg(feature = "with_mimalloc")]
mod with_mimalloc {
    #[global_allocator]
    static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
}

fn main() {
    cli::main();
}

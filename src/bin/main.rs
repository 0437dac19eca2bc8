use std::process;

use clap::Parser;
use logger::Logger;
use parser::Cli;

#[macro_use]
extern crate log;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Parse command line arguments and run the requested pipeline.
fn main() {
    let cli = Cli::parse();
    Logger::init(cli.verbose + u8::from(!cli.quiet));

    if let Err(e) = gtpack_rs::run(&cli.commands) {
        error!("{e:?}");
        process::exit(1);
    }
}

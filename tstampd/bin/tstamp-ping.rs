#![forbid(unsafe_code)]

use std::process;

fn main() {
    if let Err(e) = tstampd::main(std::env::args()) {
        eprintln!("tstamp-ping: {e}");
        process::exit(1);
    }
}

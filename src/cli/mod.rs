pub mod args;

pub use args::{Arguments, RunMode};
use clap::Parser;

pub fn parse() -> Arguments {
    Arguments::parse()
}

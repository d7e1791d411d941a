pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{align::Align, command::Command};
use enum_dispatch::enum_dispatch;
use env_logger::Env;
use log::error;
use pbfix::util::version::built_info;
use std::process::exit;

#[derive(Parser, Debug)]
#[command(version = built_info::VERSION.as_str())]
struct Args {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[enum_dispatch(Command)]
#[derive(Parser, Debug)]
#[command(version = built_info::VERSION.as_str())]
enum Subcommand {
    Align(Align),
}

fn main() {
    let args: Args = Args::parse();
    let level = if args.subcommand.verbose() {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(err) = args.subcommand.execute() {
        error!("{:#}", err);
        exit(1);
    }
}

fn main() {
    ql_cli::init_logging();
    std::process::exit(ql_cli::run_cli_from_args(std::env::args_os()));
}

fn main() {
    use clap::Parser;
    use std::error::Error;
    use yuque_export::logging::{self, Verbosity};

    let args = yuque_export::cli::Args::parse();
    if let Err(e) = logging::init(Verbosity::from_flags(args.quiet, args.verbose)) {
        eprintln!("{:#}", e);
    }
    if let Err(e) = yuque_export::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}

use std::{env, fs, process};

use flagd_studio::Session;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Please pass the path of a flag document as the first argument");
        process::exit(1);
    }
    let path = &args[1];

    let text = fs::read_to_string(path).expect("failed to read document");
    let session = Session::new();
    let count = session.import(&text).expect("invalid flag document");
    eprintln!("imported {} flag(s)", count);

    for (key, findings) in session.validate_all() {
        for finding in findings {
            eprintln!("{}: {}", key, finding);
        }
    }

    println!("{}", session.export().expect("failed to export"));
}

fn main() {
    if let Err(err) = blockfocus_lib::run() {
        eprintln!("blockfocus: {err:#}");
        std::process::exit(1);
    }
}

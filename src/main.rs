fn main() {
    if let Err(error) = drive_filer_lib::run() {
        eprintln!("{:#}", error);
        std::process::exit(1);
    }
}

fn main() {
    if let Err(err) = kendra_bindu_lib::run() {
        log::error!("kendra-bindu exited with error: {err:#}");
        std::process::exit(1);
    }
}

fn main() {
    if let Err(err) = presence_monitor_lib::run() {
        eprintln!("presence-monitor: {err:#}");
        std::process::exit(1);
    }
}

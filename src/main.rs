fn main() {
    std::process::exit(presence_tracker_lib::run());
}

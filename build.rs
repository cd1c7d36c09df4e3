fn main() {
    // The ESP-IDF environment is only needed for Xtensa targets; host builds
    // and tests skip it. Build scripts run on the host, so check TARGET.
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.contains("xtensa") {
        embuild::espidf::sysenv::output();
    }
}

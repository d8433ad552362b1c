fn main() {
    println!("cargo:rerun-if-changed=config/server.json");

    // The ESP-IDF environment only exists for firmware builds; host tests
    // build with `--no-default-features`.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}

fn main() {
    // The gs_* collaborator symbols live in the host binary and resolve
    // when the module is loaded.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        println!("cargo:rustc-link-arg=-Wl,-undefined,dynamic_lookup");
    }
}

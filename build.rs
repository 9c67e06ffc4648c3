fn main() {
    #[cfg(not(any(feature = "json", feature = "messagepack")))]
    compile_error!("ruts-kv requires either the 'json' or the 'messagepack' feature to be enabled");

    #[cfg(all(feature = "json", feature = "messagepack"))]
    compile_error!("Cannot enable both 'json' and 'messagepack' features simultaneously");
}

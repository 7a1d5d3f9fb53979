//! Command-line entry point for generating `UniFFI` foreign-language bindings.

fn main() {
    uniffi::uniffi_bindgen_main();
}

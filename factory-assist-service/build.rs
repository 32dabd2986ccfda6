fn main() {
    // PDFium is bound at runtime, nothing to build. It is looked up in:
    // 1. the current directory
    // 2. vendor/pdfium/lib/
    // 3. system library paths
    println!("cargo:rerun-if-changed=build.rs");
}

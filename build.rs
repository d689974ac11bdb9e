//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into the gRPC server and client stubs
//! pulled in by `src/protocol.rs`. A system `protoc` is used when `PROTOC`
//! is set, otherwise the vendored binary.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}

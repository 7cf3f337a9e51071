// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! A build script to generate the function-bus gRPC API (client and server stubs).

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The gRPC stubs are vendored in `src/stubs` to avoid depending on protoc
    // in CI.
    //
    // To regenerate the gRPC API from the proto file:
    // - Uncomment the following lines.
    // - Run `cargo build` to regenerate the API.
    // - Comment the following lines.
    // - Commit the changes.
    // tonic_build::configure()
    //     .out_dir("src/stubs")
    //     .compile_protos(&["proto/fnbus/v1/fnbus.proto"], &["proto"])?;
    Ok(())
}

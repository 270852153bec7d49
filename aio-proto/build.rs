fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().build_server(true).build_client(true).compile_protos(
        &[
            "proto/registry.proto",
            "proto/user.proto",
            "proto/config.proto",
            "proto/agent.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}

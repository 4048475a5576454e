use std::io::Result;
use std::path::Path;

fn main() -> Result<()> {
    let proto_dir = Path::new("proto");
    let proto = proto_dir.join("onnx.proto3");
    println!("cargo:rerun-if-changed={}", proto.display());
    let file_descriptors =
        protox::compile([&proto], [proto_dir]).map_err(std::io::Error::other)?;
    prost_build::Config::new().compile_fds(file_descriptors)?;
    Ok(())
}

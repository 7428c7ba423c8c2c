// This build script generates the rust source files for the ext-proc
// GRPC contract with the host proxy.
fn main() -> Result<(), anyhow::Error> {
	unsafe { std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?) };

	let proto_files = ["proto/extproc.proto"]
		.iter()
		.map(|name| std::env::current_dir().unwrap().join(name))
		.collect::<Vec<_>>();
	let include_dirs = ["proto/"]
		.iter()
		.map(|i| std::env::current_dir().unwrap().join(i))
		.collect::<Vec<_>>();
	let config = {
		let mut c = prost_build::Config::new();
		c.disable_comments(Some("."));
		c.bytes(["."]);
		c
	};

	tonic_build::configure()
		.build_server(true)
		.compile_well_known_types(true)
		.extern_path(".google.protobuf", "::pbjson_types")
		.compile_protos_with_config(
			config,
			&proto_files
				.iter()
				.map(|path| path.to_str().unwrap())
				.collect::<Vec<_>>(),
			&include_dirs
				.iter()
				.map(|p| p.to_str().unwrap())
				.collect::<Vec<_>>(),
		)?;

	// Re-run only when the proto files change.
	for path in [proto_files, include_dirs].concat() {
		println!("cargo:rerun-if-changed={}", path.to_str().unwrap());
	}

	Ok(())
}

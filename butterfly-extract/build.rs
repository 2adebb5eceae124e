fn main() {
    protobuf_codegen::Codegen::new()
        .pure()
        .include("proto")
        .inputs(["proto/fileformat.proto", "proto/osmformat.proto"])
        .cargo_out_dir("osmpbf")
        .run_from_script();
}

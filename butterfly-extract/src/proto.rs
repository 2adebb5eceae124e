//! OSMPBF messages generated from `proto/*.proto` by `build.rs`.

include!(concat!(env!("OUT_DIR"), "/osmpbf/mod.rs"));

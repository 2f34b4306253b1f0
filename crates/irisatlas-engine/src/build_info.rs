//! Compiler, target, and dependency versions captured by `build.rs`.

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

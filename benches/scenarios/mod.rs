mod patch;

pub use patch::bench_patch;

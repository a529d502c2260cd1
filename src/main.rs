//! # Voxel World Demo Entry Point
//!
//! Calls into the library's `run()` function, which generates a world and runs its
//! background threads for a few seconds.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- [config.json]
//! ```

fn main() {
    if let Err(e) = voxel_world::run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

use anyhow::{bail, Result};
use std::{env, path::PathBuf};

const LINKER_SCRIPT: &str = "raspbootin.ld";

fn configure_linker_script() -> Result<()> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let script = manifest_dir.join(LINKER_SCRIPT);
    if !script.exists() {
        bail!("Missing linker script {}", script.display());
    }

    println!("cargo:rerun-if-changed={}", LINKER_SCRIPT);
    println!("cargo:rustc-link-arg-bins=-T{}", script.display());
    Ok(())
}

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds only carry the library and its tests.
    match env::var("CARGO_CFG_TARGET_ARCH").as_deref() {
        Ok("arm") => configure_linker_script(),
        _ => Ok(()),
    }
}

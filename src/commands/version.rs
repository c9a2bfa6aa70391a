use crate::error::Result;
use crate::version;

pub fn execute() -> Result<()> {
    let (os, arch) = version::host_platform();
    println!("{} {} ({}-{})", version::PKG_NAME, version::VERSION, os, arch);
    Ok(())
}

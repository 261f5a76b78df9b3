use crate::utils::error::{GieError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// 從 CDS 的 zip 取出唯一的 NetCDF 檔
///
/// 已存在且不覆寫時直接回傳既有路徑。
pub fn extract_single_netcdf(archive: &Path, dest_dir: &Path, overwrite: bool) -> Result<PathBuf> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;

    let netcdf_names: Vec<String> = zip
        .file_names()
        .filter(|name| name.ends_with(".nc"))
        .map(str::to_string)
        .collect();

    if netcdf_names.len() != 1 {
        return Err(GieError::ArchiveLayout {
            archive: archive.display().to_string(),
            found: netcdf_names.len(),
        });
    }
    let entry_name = &netcdf_names[0];

    // 只取檔名，避免 zip 內路徑逃逸目標目錄
    let file_name = Path::new(entry_name)
        .file_name()
        .ok_or_else(|| GieError::ArchiveLayout {
            archive: archive.display().to_string(),
            found: 0,
        })?;
    let output_path = dest_dir.join(file_name);

    if output_path.is_file() && !overwrite {
        tracing::info!("Unzip exists: {}", archive.display());
        return Ok(output_path);
    }

    tracing::info!("Unzipping {}...", archive.display());
    std::fs::create_dir_all(dest_dir)?;
    let mut entry = zip.by_name(entry_name)?;
    let mut out = BufWriter::new(File::create(&output_path)?);
    std::io::copy(&mut entry, &mut out)?;
    tracing::info!("Unzip complete: {}", archive.display());

    Ok(output_path)
}

use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .expect("invalid progress bar template")
        .progress_chars("##-")
}

/// 返回 `path` 对应的临时文件路径，即在文件名后追加 `.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 先写入临时文件，成功后再重命名为目标文件
///
/// 写入过程中断时，原文件保持不变
pub fn write_atomic<F>(path: &Path, f: F) -> io::Result<()>
where
    F: FnOnce(File) -> io::Result<()>,
{
    let tmp = tmp_path(path);
    let result = File::create(&tmp).and_then(f);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
}

/// 将文件重命名为 `<name>.corrupt-<时间戳>`，返回新路径
pub fn move_aside(path: &Path) -> io::Result<PathBuf> {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".corrupt-{}", ts));
    let target = path.with_file_name(name);
    std::fs::rename(path, &target)?;
    Ok(target)
}

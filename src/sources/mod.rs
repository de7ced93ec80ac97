pub mod file;
pub mod speedtest;

use crate::traits::DirectorySource;
use std::path::PathBuf;

/// 指定了目录文件时使用本地 JSON, 否则使用 speedtest.net
pub fn get_source(directory_file: Option<PathBuf>) -> Box<dyn DirectorySource> {
    match directory_file {
        Some(path) => Box::new(file::JsonDirectory::new(path)),
        None => Box::new(speedtest::SpeedtestNet::new()),
    }
}

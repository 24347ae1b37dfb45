//! Output directory and artifact layout.
//!
//! ```text
//! <output root>/[<timestamp>/]
//! ├── {dir}/{name}.soy.lua               # one locale or none
//! ├── {dir}/{stem}_{locale}.soy.lua      # several locales
//! └── {concat}[_{locale}].soy.concat.lua # concat_output
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::CompilerConfig;

/// Extension of template sources.
pub const SOURCE_EXTENSION: &str = "soy";

/// Extension appended to each source name to form its artifact.
pub const ARTIFACT_EXTENSION: &str = "lua";

/// Suffix shared by all compiled artifacts, used to discover them.
pub const COMPILED_SUFFIX: &str = "soy.lua";

/// Effective output directory for a compile started at `now`.
pub fn resolve_output_dir(config: &CompilerConfig, now: DateTime<Utc>) -> PathBuf {
    let root = config.output_root();
    if config.unique_dir {
        root.join(unique_segment(now))
    } else {
        root.to_path_buf()
    }
}

/// ISO-8601 UTC timestamp usable as a directory name on every platform.
pub fn unique_segment(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace(':', "_")
}

/// Output path template handed to the external compiler.
pub fn output_path_format(output_dir: &Path, multi_locale: bool) -> String {
    let pattern = if multi_locale {
        "{INPUT_DIRECTORY}{INPUT_FILE_NAME_NO_EXT}_{LOCALE}.soy.lua"
    } else {
        "{INPUT_DIRECTORY}{INPUT_FILE_NAME}.lua"
    };
    format!("{}/{pattern}", output_dir.display())
}

/// Path of the artifact the compiler writes for `file`.
///
/// `locale` is only given when several locales are compiled at once.
pub fn artifact_path(output_dir: &Path, file: &Path, locale: Option<&str>) -> PathBuf {
    let path = output_dir.join(relative_part(file));

    if let Some(locale) = locale {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(stem) = name.strip_suffix(".soy") {
            return path.with_file_name(format!("{stem}_{locale}.{COMPILED_SUFFIX}"));
        }
    }

    let mut path = OsString::from(path);
    path.push(".");
    path.push(ARTIFACT_EXTENSION);
    PathBuf::from(path)
}

/// Write the concatenation of `artifacts` and return its path.
pub fn concat_artifacts(
    output_dir: &Path,
    artifacts: &[PathBuf],
    concat_file_name: &str,
    locale: Option<&str>,
) -> io::Result<PathBuf> {
    let file_name = match locale {
        Some(locale) => format!("{concat_file_name}_{locale}.soy.concat.{ARTIFACT_EXTENSION}"),
        None => format!("{concat_file_name}.soy.concat.{ARTIFACT_EXTENSION}"),
    };
    let target = output_dir.join(file_name);

    let mut concatenated = String::new();
    for artifact in artifacts {
        concatenated.push_str(&std::fs::read_to_string(artifact)?);
    }
    std::fs::write(&target, concatenated)?;
    Ok(target)
}

/// Remove a compile's output directory.
pub async fn erase(output_dir: &Path) -> io::Result<()> {
    tokio::fs::remove_dir_all(output_dir).await
}

/// Strip root and prefix components so an absolute source nests under the output dir.
fn relative_part(file: &Path) -> PathBuf {
    file.components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}

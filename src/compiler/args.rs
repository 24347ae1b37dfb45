//! Argument list for the external template compiler.

use std::ffi::OsString;

use crate::config::CompilerConfig;

use super::CompileJob;
use super::output::output_path_format;

/// Separator between classpath entries on this platform.
#[cfg(windows)]
const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: &str = ":";

/// Build the arguments passed to `config.compiler.program`.
///
/// File paths are passed as given; the compiler runs in `job.input_dir`.
pub fn build_args(job: &CompileJob, config: &CompilerConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    let mut classpath = vec![config.compiler.jar.to_string_lossy().into_owned()];
    classpath.extend(config.classpath.iter().cloned());
    args.push("-classpath".into());
    args.push(classpath.join(CLASSPATH_SEPARATOR).into());

    args.push(config.compiler.entry_point.as_str().into());
    args.push("--codeStyle".into());
    args.push("concat".into());
    args.push("--shouldGenerateJsdoc".into());

    if config.use_closure_style {
        args.push("--shouldProvideRequireSoyNamespaces".into());
    }
    if let Some(scheme) = &config.css_handling_scheme {
        args.push("--cssHandlingScheme".into());
        args.push(scheme.as_str().into());
    }

    args.extend(job.files.iter().map(|file| file.as_os_str().to_owned()));

    if !config.plugin_modules.is_empty() {
        args.push("--pluginModules".into());
        args.push(config.plugin_modules.join(",").into());
    }
    if !job.locales.is_empty() {
        args.push("--locales".into());
        args.push(job.locales.join(",").into());
    }
    if let Some(format) = &config.message_file_path_format {
        args.push("--messageFilePathFormat".into());
        args.push(format.as_str().into());
    }
    if !config.should_declare_top_level_namespaces {
        args.push("--shouldDeclareTopLevelNamespaces".into());
        args.push("false".into());
    }

    args.push("--isUsingIjData".into());
    args.push("--outputPathFormat".into());
    args.push(output_path_format(&job.output_dir, job.is_multi_locale()).into());

    args
}

//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Templet template compiler CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Output directory for compiled artifacts
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Config file path, used only if it exists (default: templet.toml)
    #[arg(short = 'C', long, global = true, default_value = "templet.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile every template under a directory and load the results
    #[command(visible_alias = "c")]
    Compile {
        /// Directory containing template sources
        #[arg(value_hint = clap::ValueHint::DirPath)]
        input: PathBuf,

        /// Locales to compile for (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        locales: Option<Vec<String>>,
    },

    /// Compile, then render one template to stdout
    #[command(visible_alias = "r")]
    Render {
        /// Directory containing template sources
        #[arg(value_hint = clap::ValueHint::DirPath)]
        input: PathBuf,

        /// Dotted template name, e.g. `mail.formletter`
        template: String,

        /// Template data as a JSON object
        #[arg(short, long)]
        data: Option<String>,

        /// Injected data as a JSON object
        #[arg(long)]
        ij: Option<String>,

        /// Locale to render with
        #[arg(short, long)]
        locale: Option<String>,
    },

    /// Compile and recompile on change until interrupted
    #[command(visible_alias = "w")]
    Watch {
        /// Directory containing template sources
        #[arg(value_hint = clap::ValueHint::DirPath)]
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render() {
        let cli = Cli::try_parse_from([
            "templet",
            "render",
            "templates",
            "mail.formletter",
            "--data",
            r#"{"title":"Mr."}"#,
            "--locale",
            "en",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("templet.toml"));
        match cli.command {
            Commands::Render {
                input,
                template,
                data,
                ij,
                locale,
            } => {
                assert_eq!(input, PathBuf::from("templates"));
                assert_eq!(template, "mail.formletter");
                assert_eq!(data.as_deref(), Some(r#"{"title":"Mr."}"#));
                assert!(ij.is_none());
                assert_eq!(locale.as_deref(), Some("en"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "templet", "compile", "src", "-l", "en,fr", "-C", "conf.toml", "-V",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("conf.toml"));
        assert!(matches!(
            cli.command,
            Commands::Compile { locales: Some(ref l), .. } if l == &["en", "fr"]
        ));
    }

    #[test]
    fn test_missing_input_rejected() {
        assert!(Cli::try_parse_from(["templet", "watch"]).is_err());
    }
}

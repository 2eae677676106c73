use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

pub fn render_completions(shell: CompletionShell) -> Vec<u8> {
    fn render<G: Generator>(generator: G) -> Vec<u8> {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        let mut buffer = Vec::new();
        generate(generator, &mut command, name, &mut buffer);
        buffer
    }

    match shell {
        CompletionShell::Bash => render(shells::Bash),
        CompletionShell::Zsh => render(shells::Zsh),
        CompletionShell::Fish => render(shells::Fish),
    }
}

pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = render_completions(shell);

    match output_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &script)?;
            println!("{}", path.display());
        }
        None => io::stdout().write_all(&script)?,
    }

    Ok(())
}

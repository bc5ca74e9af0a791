use clap::Parser;
use clap_complete::Shell;

/// Arguments for completions command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                  Generate bash completions:\n    homestead completions bash > ~/.bash_completion.d/homestead\n\n\
                  Generate zsh completions:\n    homestead completions zsh > ~/.zfunc/_homestead\n\n\
                  Generate fish completions:\n    homestead completions fish > ~/.config/fish/completions/homestead.fish")]
pub struct CompletionsArgs {
    /// Shell type
    #[arg(value_enum, ignore_case = true)]
    pub shell: Shell,
}

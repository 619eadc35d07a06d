//! The closed set of built-in commands.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Pwd,
    Cd,
    Ls,
    Tree,
    Mkdir,
    Rm,
    Rmdir,
    Mv,
    Cp,
    Cat,
    Echo,
    Stat,
    Open,
    Edit,
    History,
    Reset,
    Sudo,
}

impl Command {
    pub const ALL: &'static [Command] = &[
        Command::Help,
        Command::Clear,
        Command::Pwd,
        Command::Cd,
        Command::Ls,
        Command::Tree,
        Command::Mkdir,
        Command::Rm,
        Command::Rmdir,
        Command::Mv,
        Command::Cp,
        Command::Cat,
        Command::Echo,
        Command::Stat,
        Command::Open,
        Command::Edit,
        Command::History,
        Command::Reset,
        Command::Sudo,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Clear => "clear",
            Command::Pwd => "pwd",
            Command::Cd => "cd",
            Command::Ls => "ls",
            Command::Tree => "tree",
            Command::Mkdir => "mkdir",
            Command::Rm => "rm",
            Command::Rmdir => "rmdir",
            Command::Mv => "mv",
            Command::Cp => "cp",
            Command::Cat => "cat",
            Command::Echo => "echo",
            Command::Stat => "stat",
            Command::Open => "open",
            Command::Edit => "edit",
            Command::History => "history",
            Command::Reset => "reset",
            Command::Sudo => "sudo",
        }
    }

    /// Argument synopsis, as shown by `help` and usage errors.
    pub fn synopsis(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Clear => "clear",
            Command::Pwd => "pwd",
            Command::Cd => "cd [path]",
            Command::Ls => "ls [path]",
            Command::Tree => "tree [path]",
            Command::Mkdir => "mkdir <path>",
            Command::Rm => "rm <file>",
            Command::Rmdir => "rmdir <dir>",
            Command::Mv => "mv <from> <to>",
            Command::Cp => "cp <from> <to>",
            Command::Cat => "cat <file>",
            Command::Echo => "echo <text...> > <file>",
            Command::Stat => "stat <path>",
            Command::Open => "open <file>",
            Command::Edit => "edit <file>",
            Command::History => "history",
            Command::Reset => "reset",
            Command::Sudo => "sudo reset [--confirm]",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Command::Help => "show this help",
            Command::Clear => "clear the screen",
            Command::Pwd => "print the working directory",
            Command::Cd => "change directory (default /)",
            Command::Ls => "list directory entries",
            Command::Tree => "show a directory tree",
            Command::Mkdir => "create a directory",
            Command::Rm => "remove a file",
            Command::Rmdir => "remove an empty directory",
            Command::Mv => "move or rename",
            Command::Cp => "copy a file",
            Command::Cat => "print a file",
            Command::Echo => "write text to a file",
            Command::Stat => "show type and size",
            Command::Open => "open a file in the viewer",
            Command::Edit => "open a file in the editor, creating it if needed",
            Command::History => "list previous commands",
            Command::Reset => "see sudo reset",
            Command::Sudo => "erase all data and reload",
        }
    }

    pub fn usage(self) -> String {
        format!("usage: {}", self.synopsis())
    }
}

/// Fixed listing printed by `help`.
pub fn help_text() -> String {
    let width = Command::ALL
        .iter()
        .map(|c| c.synopsis().len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Available commands:");
    for cmd in Command::ALL {
        out.push_str(&format!("\n  {:<width$}  {}", cmd.synopsis(), cmd.summary()));
    }
    out
}

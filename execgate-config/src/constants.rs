/// Built-in defaults shared by the config loader and the CLI.
pub mod defaults {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
    pub const DEFAULT_KILL_GRACE_PERIOD_MS: u64 = 500;

    /// Executables that auto-approve under `on_request` when no dangerous
    /// pattern is present.
    pub const KNOWN_SAFE_COMMANDS: &[&str] = &[
        "ls", "cat", "head", "tail", "grep", "find", "pwd", "echo", "which", "whereis", "date",
        "whoami", "id", "uname", "uptime",
    ];

    /// Executables that are always classified as dangerous.
    pub const DANGEROUS_COMMANDS: &[&str] = &[
        "rm", "rmdir", "mv", "cp", "dd", "mkfs", "fdisk", "mount", "umount", "chmod", "chown",
        "su", "sudo", "passwd",
    ];

    /// Regexes matched against every word, operator, and rendered redirection
    /// of a parsed command.
    pub const DANGEROUS_PATTERNS: &[&str] = &[
        // recursive + force, in any bundled order
        r"^-[A-Za-z]*(?:[rR][A-Za-z]*f|f[A-Za-z]*[rR])[A-Za-z]*$",
        r"^--no-preserve-root$",
        // chaining operators
        r"^(?:;|&&|\|\||&)$",
        r"`",
        r"\$\(",
        // redirection into system paths
        r"^\d*(?:>|>>|>&)/(?:etc|bin|sbin|usr|boot|lib|lib32|lib64|sys|proc|var)(?:/|$)",
    ];
}

pub mod paths {
    pub const CONFIG_DIR_NAME: &str = "execgate";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
    /// Overrides the config file location.
    pub const CONFIG_PATH_ENV: &str = "EXECGATE_CONFIG";
}

use colored::Colorize;

/// Print a titled banner on stderr
pub fn print_header(text: &str) {
    eprintln!();
    eprintln!("{}", text.bold().bright_cyan());
    eprintln!("{}", "=".repeat(text.len()));
}

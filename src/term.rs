use colored::*;
use std::io::Write;

pub fn ask_secret(prompt: &str) -> std::io::Result<String> {
    print!("{} {} ", "  SECRET  ".black().on_white(), prompt);
    std::io::stdout().flush()?;
    rpassword::read_password()
}

/// A progress line: `Signing file... OK`.
///
/// The label is printed when the step starts and the outcome is appended to
/// the same line when it finishes.
pub struct Step;

impl Step {
    pub fn start(label: &str) -> std::io::Result<Step> {
        print!("{}... ", label);
        std::io::stdout().flush()?;
        Ok(Step)
    }

    pub fn ok(self) {
        println!("{}", "OK".green());
    }

    pub fn fail(self) {
        println!("{}", "ERROR".red());
    }

    /// Finishes the step according to `result` and hands it back.
    pub fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.ok(),
            Err(_) => self.fail(),
        }
        result
    }
}

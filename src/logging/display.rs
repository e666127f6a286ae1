//! Command-line table display
use super::{LogError, SummaryWriter};
use std::fmt;
use std::time::Duration;
use yansi::Paint;

/// Logging backend that displays each row as a table on standard output.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayBackend;

impl SummaryWriter for DisplayBackend {
    fn write_row(
        &mut self,
        _step: u64,
        row: &[(String, f64)],
        elapsed: Duration,
    ) -> Result<(), LogError> {
        let key_width = row.iter().map(|(k, _)| k.len()).max().unwrap_or(0).max(15);
        let rule = "-".repeat(key_width + 20);
        println!("{}", rule);
        for (key, value) in row {
            println!(
                "| {:>width$} | {:>15} |",
                Paint::fixed(35, key),
                PrettyPrint(*value),
                width = key_width
            );
        }
        println!("{}", rule);
        println!("{}", Paint::fixed(8, format!("elapsed {:.1?}", elapsed)));
        Ok(())
    }
}

/// Display a number in fixed or scientific notation depending on its magnitude.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PrettyPrint(pub f64);

impl fmt::Display for PrettyPrint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let magnitude = self.0.abs();
        let text = if (magnitude >= 1e6 || magnitude <= 1e-4) && self.0 != 0.0 && self.0.is_finite()
        {
            format!("{:.3e}", self.0)
        } else {
            format!("{:.4}", self.0)
        };
        f.pad(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1.5, "1.5000")]
    #[case(0.0, "0.0000")]
    #[case(2.5e7, "2.500e7")]
    #[case(-3e-6, "-3.000e-6")]
    #[case(f64::NAN, "NaN")]
    fn pretty_print(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(PrettyPrint(value).to_string(), expected);
    }

    #[test]
    fn pretty_print_pads() {
        assert_eq!(format!("{:>8}", PrettyPrint(1.0)), "  1.0000");
    }

    #[test]
    fn writes_row() {
        let row = vec![("Metrics/EpRet".to_string(), 12.0)];
        DisplayBackend
            .write_row(0, &row, Duration::from_secs(1))
            .unwrap();
    }
}

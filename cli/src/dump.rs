//! Printing device snapshots on a terminal.
use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use vm::{DeviceSnapshot, PAGE_BREAK};

fn colour_choice() -> ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Write a device snapshot to stdout: block devices one addressed
/// word per line, line devices verbatim with page breaks called out.
pub fn print_snapshot(snapshot: &DeviceSnapshot) -> Result<(), std::io::Error> {
    let mut stream = StandardStream::stdout(colour_choice());
    match snapshot {
        DeviceSnapshot::Words(words) => {
            for (offset, word) in words.iter().enumerate() {
                writeln!(stream, "{offset:5}  {word}")?;
            }
        }
        DeviceSnapshot::Lines(lines) => {
            for line in lines {
                if line.chars().eq(std::iter::once(PAGE_BREAK)) {
                    stream.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
                    writeln!(stream, "──────── new page ────────")?;
                    stream.reset()?;
                } else {
                    writeln!(stream, "{line}")?;
                }
            }
        }
    }
    Ok(())
}

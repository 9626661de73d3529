use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// Source of integers for `RED`.
pub trait Input {
    /// Next value, or `None` once the input is exhausted.
    fn read(&mut self) -> Option<i64>;
}

/// Sink for values popped by `WRT`.
pub trait Output {
    fn write(&mut self, value: i64);
}

impl Input for VecDeque<i64> {
    fn read(&mut self) -> Option<i64> {
        self.pop_front()
    }
}

impl Output for Vec<i64> {
    fn write(&mut self, value: i64) {
        self.push(value);
    }
}

/// Reads whitespace-separated integers from a buffered reader on demand.
///
/// Tokens that do not parse as integers are skipped with a warning.
pub struct ReaderInput<R> {
    reader: R,
    pending: VecDeque<i64>,
}

impl<R: BufRead> ReaderInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
        }
    }

    /// Pulls lines until at least one value is buffered or the reader ends.
    fn fill(&mut self) {
        let mut line = String::new();
        while self.pending.is_empty() {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, "input read failed");
                    return;
                }
            }

            for word in line.split_whitespace() {
                match word.parse::<i64>() {
                    Ok(n) => self.pending.push_back(n),
                    Err(_) => tracing::warn!(token = word, "skipping non-integer input"),
                }
            }
        }
    }
}

impl<R: BufRead> Input for ReaderInput<R> {
    fn read(&mut self) -> Option<i64> {
        self.fill();
        self.pending.pop_front()
    }
}

/// Writes each value on its own line.
pub struct WriterOutput<W> {
    writer: W,
}

impl<W: Write> WriterOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> Output for WriterOutput<W> {
    fn write(&mut self, value: i64) {
        if let Err(err) = writeln!(self.writer, "{}", value).and_then(|_| self.writer.flush()) {
            tracing::warn!(%err, "output write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_input_drains_in_order() {
        let mut input: VecDeque<i64> = VecDeque::from(vec![4, -2]);
        assert_eq!(input.read(), Some(4));
        assert_eq!(input.read(), Some(-2));
        assert_eq!(input.read(), None);
    }

    #[test]
    fn test_reader_input_spans_lines() {
        let mut input = ReaderInput::new("1 2\n\n  3\nx 4\n".as_bytes());
        assert_eq!(input.read(), Some(1));
        assert_eq!(input.read(), Some(2));
        assert_eq!(input.read(), Some(3));
        assert_eq!(input.read(), Some(4));
        assert_eq!(input.read(), None);
    }

    #[test]
    fn test_writer_output_one_per_line() {
        let mut buf = Vec::new();
        {
            let mut out = WriterOutput::new(&mut buf);
            out.write(30);
            out.write(-1);
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "30\n-1\n");
    }
}

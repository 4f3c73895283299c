/// Lines accepted before the output file exists, held for a single in-order drain.
#[derive(Debug, Default)]
pub struct PendingLines {
    lines: Vec<String>,
    drained: bool,
}

impl PendingLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        debug_assert!(!self.drained, "pending lines pushed after drain");
        self.lines.push(line);
    }

    /// Hands over every buffered line in arrival order. The buffer is inert afterwards.
    pub fn drain(&mut self) -> Vec<String> {
        self.drained = true;
        std::mem::take(&mut self.lines)
    }
}

#[cfg(test)]
impl PendingLines {
    fn len(&self) -> usize {
        self.lines.len()
    }

    fn is_drained(&self) -> bool {
        self.drained
    }
}

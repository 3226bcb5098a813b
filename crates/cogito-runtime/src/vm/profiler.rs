//! VM profiling
//!
//! Counts executed instructions per opcode and tracks the deepest operand
//! stack and call stack seen. Disabled unless the host asks for it.

use crate::bytecode::Opcode;
use std::collections::HashMap;

/// VM profiler
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    total_instructions: u64,
    instruction_counts: HashMap<Opcode, u64>,
    max_stack_depth: usize,
    max_frame_depth: usize,
    suspensions: u64,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record one executed instruction and the machine shape before it ran
    pub fn record(&mut self, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        self.total_instructions += 1;
        *self.instruction_counts.entry(opcode).or_insert(0) += 1;
        self.max_stack_depth = self.max_stack_depth.max(stack_depth);
        self.max_frame_depth = self.max_frame_depth.max(frame_depth);
    }

    /// Record a CC suspension
    pub fn record_suspension(&mut self) {
        self.suspensions += 1;
    }

    pub fn total_instructions(&self) -> u64 {
        self.total_instructions
    }

    pub fn instruction_count(&self, opcode: Opcode) -> u64 {
        self.instruction_counts.get(&opcode).copied().unwrap_or(0)
    }

    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn max_frame_depth(&self) -> usize {
        self.max_frame_depth
    }

    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }

    /// Formatted execution statistics
    pub fn report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "Total instructions executed: {}\n",
            self.total_instructions
        ));
        report.push_str(&format!("Max stack depth: {}\n", self.max_stack_depth));
        report.push_str(&format!("Max call depth: {}\n", self.max_frame_depth));
        report.push_str(&format!("Suspensions: {}\n\n", self.suspensions));

        if self.instruction_counts.is_empty() {
            report.push_str("No instructions recorded\n");
            return report;
        }

        report.push_str("Instruction counts by opcode:\n");

        // Sort by count (descending), then by byte for a stable order
        let mut counts: Vec<_> = self.instruction_counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then((*a.0 as u8).cmp(&(*b.0 as u8))));

        for (opcode, count) in counts {
            let percentage = (*count as f64 / self.total_instructions as f64) * 100.0;
            report.push_str(&format!(
                "  {:<22} {:>10} ({:>6.2}%)\n",
                opcode.name(),
                count,
                percentage
            ));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_and_depths() {
        let mut profiler = Profiler::new();
        profiler.record(Opcode::Add, 2, 1);
        profiler.record(Opcode::Add, 5, 3);
        profiler.record(Opcode::Pop, 1, 1);

        assert_eq!(profiler.total_instructions(), 3);
        assert_eq!(profiler.instruction_count(Opcode::Add), 2);
        assert_eq!(profiler.instruction_count(Opcode::Sub), 0);
        assert_eq!(profiler.max_stack_depth(), 5);
        assert_eq!(profiler.max_frame_depth(), 3);
    }

    #[test]
    fn test_reset() {
        let mut profiler = Profiler::new();
        profiler.record(Opcode::Add, 1, 1);
        profiler.record_suspension();
        profiler.reset();
        assert_eq!(profiler.total_instructions(), 0);
        assert_eq!(profiler.suspensions(), 0);
    }

    #[test]
    fn test_report_with_data() {
        let mut profiler = Profiler::new();
        profiler.record(Opcode::Add, 0, 1);
        profiler.record(Opcode::Add, 0, 1);
        profiler.record(Opcode::JumpIfFalse, 0, 1);

        let report = profiler.report();
        assert!(report.contains("Total instructions executed: 3"));
        assert!(report.contains("ADD"));
        assert!(report.contains("JUMP_IF_FALSE"));
        assert!(report.contains("66.67%"));
        assert!(report.contains("33.33%"));
    }

    #[test]
    fn test_report_empty() {
        let report = Profiler::new().report();
        assert!(report.contains("No instructions recorded"));
    }
}

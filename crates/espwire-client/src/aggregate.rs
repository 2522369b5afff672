//! Assemblers for logical records that span several response packets.

use espwire_frame::{AlertData, SweepDefinition, SweepSection};
use tracing::{debug, trace};

/// Builds alert tables from individual alert entries.
#[derive(Debug, Default)]
pub struct AlertTableProcessor {
    alerts: Vec<AlertData>,
}

impl AlertTableProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns a complete table, ordered by index, once every
    /// index of the current table has arrived. A zero count yields the empty
    /// table.
    pub fn add(&mut self, alert: AlertData) -> Option<Vec<AlertData>> {
        let count = alert.count;
        if count == 0 {
            self.alerts.clear();
            return Some(Vec::new());
        }
        self.alerts.retain(|a| a.index != alert.index);
        self.alerts.push(alert);

        if self.alerts.len() < usize::from(count) {
            return None;
        }
        let mut table = Vec::with_capacity(usize::from(count));
        for index in 1..=count {
            match self
                .alerts
                .iter()
                .find(|a| a.index == index && a.count == count)
            {
                Some(found) => table.push(*found),
                None => {
                    trace!(index, count, "alert table incomplete");
                    return None;
                }
            }
        }
        self.alerts.clear();
        Some(table)
    }

    pub fn reset(&mut self) {
        self.alerts.clear();
    }
}

/// Most sweep sections a detector reports.
pub const MAX_SWEEP_SECTIONS: usize = 15;

/// Collects sweep sections that arrive over several responses.
#[derive(Debug)]
pub struct SweepSectionProcessor {
    slots: [Option<SweepSection>; MAX_SWEEP_SECTIONS],
    received: usize,
    expected: usize,
}

impl Default for SweepSectionProcessor {
    fn default() -> Self {
        Self {
            slots: [None; MAX_SWEEP_SECTIONS],
            received: 0,
            expected: 0,
        }
    }
}

impl SweepSectionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one response's sections.
    ///
    /// `total` is the number of sections the detector will report and
    /// `contained` how many this response carries.
    pub fn add(
        &mut self,
        total: u8,
        contained: u8,
        sections: &[SweepSection],
    ) -> Option<Vec<SweepSection>> {
        if total <= contained {
            return Some(sections.to_vec());
        }
        let total = usize::from(total);
        if self.expected != total {
            self.reset();
            self.expected = total;
        }
        for section in sections {
            let Some(slot) = usize::from(section.index)
                .checked_sub(1)
                .and_then(|i| self.slots.get_mut(i))
            else {
                debug!(index = section.index, "sweep section index out of range");
                continue;
            };
            *slot = Some(*section);
            self.received += 1;
        }
        if self.received != self.expected {
            return None;
        }
        let complete = self.slots.iter().flatten().copied().collect();
        self.reset();
        Some(complete)
    }

    pub fn reset(&mut self) {
        self.slots = [None; MAX_SWEEP_SECTIONS];
        self.received = 0;
        self.expected = 0;
    }
}

/// One-shot collector for the definitions `0..=max_index`.
#[derive(Debug)]
pub struct SweepDefinitionProcessor {
    slots: Vec<Option<SweepDefinition>>,
    received: u64,
    full: u64,
}

impl SweepDefinitionProcessor {
    /// Collector for `max_index + 1` definitions.
    pub fn new(max_index: u8) -> Self {
        let count = usize::from(max_index.min(63)) + 1;
        Self {
            slots: vec![None; count],
            received: 0,
            full: if count == 64 { u64::MAX } else { (1 << count) - 1 },
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Add a definition. Returns every definition, by index, once all have
    /// arrived.
    pub fn add(&mut self, definition: SweepDefinition) -> Option<Vec<SweepDefinition>> {
        let index = usize::from(definition.index);
        let Some(slot) = self.slots.get_mut(index) else {
            debug!(index, "sweep definition index out of range");
            return None;
        };
        *slot = Some(definition);
        self.received |= 1 << index;
        if self.received != self.full {
            return None;
        }
        Some(self.slots.iter().flatten().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(index: u8, count: u8, frequency: u16) -> AlertData {
        let [hi, lo] = frequency.to_be_bytes();
        AlertData::from_bytes(&[index << 4 | count, hi, lo, 0x90, 0x10, 0x24, 0x80]).unwrap()
    }

    fn section(index: u8, count: u8, upper: u16, lower: u16) -> SweepSection {
        let [uh, ul] = upper.to_be_bytes();
        let [lh, ll] = lower.to_be_bytes();
        SweepSection::from_bytes(&[index << 4 | count, uh, ul, lh, ll]).unwrap()
    }

    #[test]
    fn alert_table_assembles_out_of_order() {
        let mut processor = AlertTableProcessor::new();
        assert!(processor.add(alert(1, 3, 34700)).is_none());
        assert!(processor.add(alert(3, 3, 24150)).is_none());
        let table = processor.add(alert(2, 3, 10525)).unwrap();
        let indices: Vec<u8> = table.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(table[1].frequency, 10525);
    }

    #[test]
    fn zero_count_clears_and_yields_empty() {
        let mut processor = AlertTableProcessor::new();
        assert!(processor.add(alert(1, 2, 34700)).is_none());
        assert_eq!(processor.add(alert(0, 0, 0)), Some(Vec::new()));
        assert!(processor.add(alert(2, 2, 24150)).is_none());
    }

    #[test]
    fn repeated_index_replaces_stale_entry() {
        let mut processor = AlertTableProcessor::new();
        assert!(processor.add(alert(1, 2, 34700)).is_none());
        assert!(processor.add(alert(1, 2, 34800)).is_none());
        let table = processor.add(alert(2, 2, 24150)).unwrap();
        assert_eq!(table[0].frequency, 34800);
    }

    #[test]
    fn entries_from_a_different_table_size_do_not_complete() {
        let mut processor = AlertTableProcessor::new();
        assert!(processor.add(alert(1, 3, 34700)).is_none());
        assert!(processor.add(alert(2, 2, 24150)).is_none());
        // Index 1 of the two-alert table is still missing.
        let table = processor.add(alert(1, 2, 10525)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].frequency, 10525);
    }

    #[test]
    fn single_response_with_all_sections_completes() {
        let mut processor = SweepSectionProcessor::new();
        let sections = [section(1, 2, 36072, 33383), section(2, 2, 24296, 23905)];
        assert_eq!(processor.add(2, 2, &sections), Some(sections.to_vec()));
    }

    #[test]
    fn sections_accumulate_across_responses() {
        let mut processor = SweepSectionProcessor::new();
        let first = [
            section(1, 4, 36072, 33383),
            section(2, 4, 24296, 23905),
            section(3, 4, 10600, 10450),
        ];
        assert!(processor.add(4, 3, &first).is_none());
        let complete = processor.add(4, 3, &[section(4, 4, 35000, 34000)]).unwrap();
        assert_eq!(complete.len(), 4);
        assert_eq!(complete[3].index, 4);

        // State resets after emitting.
        assert!(processor.add(4, 3, &first).is_none());
    }

    #[test]
    fn new_total_discards_partial_sections() {
        let mut processor = SweepSectionProcessor::new();
        assert!(processor.add(5, 3, &[section(1, 5, 1, 0)]).is_none());
        let sections = [
            section(1, 4, 36072, 33383),
            section(2, 4, 24296, 23905),
            section(3, 4, 10600, 10450),
        ];
        assert!(processor.add(4, 3, &sections).is_none());
        assert!(processor.add(4, 3, &[section(4, 4, 35000, 34000)]).is_some());
    }

    #[test]
    fn definitions_complete_when_mask_is_full() {
        let mut processor = SweepDefinitionProcessor::new(2);
        assert_eq!(processor.capacity(), 3);
        assert!(processor.add(SweepDefinition::new(2, 33900, 34100)).is_none());
        assert!(processor.add(SweepDefinition::new(0, 34700, 34900)).is_none());
        assert!(processor.add(SweepDefinition::new(0, 34700, 34900)).is_none());
        let all = processor.add(SweepDefinition::new(1, 35400, 35600)).unwrap();
        let indices: Vec<u8> = all.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_range_definition_is_ignored() {
        let mut processor = SweepDefinitionProcessor::new(0);
        assert!(processor.add(SweepDefinition::new(5, 1, 2)).is_none());
        assert!(processor.add(SweepDefinition::new(0, 1, 2)).is_some());
    }
}

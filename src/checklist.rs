//! End-of-shift checklist gate.
//!
//! A fixed set of closing duties that must all be ticked before the
//! reconciliation report can be opened. Purely local state, rebuilt every
//! time the gate is opened and never persisted.

use serde::Serialize;

use crate::error::ShiftError;

/// (id, title, description)
const CLOSING_DUTIES: &[(&str, &str, &str)] = &[
    (
        "clean-tables",
        "Clean tables",
        "Wipe down and reset all tables and chairs",
    ),
    (
        "check-inventory",
        "Check inventory",
        "Count stock levels and note items running low",
    ),
    (
        "clean-equipment",
        "Clean equipment",
        "Clean kitchen equipment and coffee machines",
    ),
    (
        "cash-count",
        "Cash count",
        "Count the cash drawer and set aside the float",
    ),
    (
        "waste-log",
        "Waste log",
        "Record discarded food and spoiled items",
    ),
    (
        "security-check",
        "Security check",
        "Lock doors and windows, switch off appliances",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistGate {
    items: Vec<ChecklistItem>,
}

impl ChecklistGate {
    /// Fresh gate with every duty unchecked.
    pub fn open() -> Self {
        let items = CLOSING_DUTIES
            .iter()
            .map(|(id, title, description)| ChecklistItem {
                id: (*id).to_string(),
                title: (*title).to_string(),
                description: (*description).to_string(),
                completed: false,
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    /// Flip one item's completion flag. Returns the new value.
    pub fn toggle(&mut self, item_id: &str) -> Result<bool, ShiftError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| ShiftError::Validation(format!("Unknown checklist item: {item_id}")))?;
        item.completed = !item.completed;
        Ok(item.completed)
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.completed)
    }

    pub fn remaining(&self) -> usize {
        self.items.iter().filter(|item| !item.completed).count()
    }

    /// Confirm the gate. Only succeeds once every item is ticked.
    pub fn complete(&self) -> Result<(), ShiftError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(ShiftError::ChecklistIncomplete)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_all(gate: &mut ChecklistGate) {
        let ids: Vec<String> = gate.items().iter().map(|i| i.id.clone()).collect();
        for id in ids {
            gate.toggle(&id).unwrap();
        }
    }

    #[test]
    fn test_open_has_six_unchecked_items() {
        let gate = ChecklistGate::open();
        assert_eq!(gate.items().len(), 6);
        assert!(gate.items().iter().all(|i| !i.completed));
        assert_eq!(gate.remaining(), 6);
    }

    #[test]
    fn test_complete_requires_every_item() {
        let mut gate = ChecklistGate::open();
        let ids: Vec<String> = gate.items().iter().map(|i| i.id.clone()).collect();
        for id in &ids[..5] {
            gate.toggle(id).unwrap();
            assert!(matches!(gate.complete(), Err(ShiftError::ChecklistIncomplete)));
        }
        gate.toggle(&ids[5]).unwrap();
        assert!(gate.complete().is_ok());
    }

    #[test]
    fn test_untoggling_disables_complete_again() {
        let mut gate = ChecklistGate::open();
        tick_all(&mut gate);
        assert!(gate.is_complete());

        assert!(!gate.toggle("waste-log").unwrap());
        assert!(!gate.is_complete());
        assert!(gate.complete().is_err());
    }

    #[test]
    fn test_toggle_only_affects_one_item() {
        let mut gate = ChecklistGate::open();
        gate.toggle("cash-count").unwrap();
        let checked: Vec<&str> = gate
            .items()
            .iter()
            .filter(|i| i.completed)
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(checked, vec!["cash-count"]);
    }

    #[test]
    fn test_toggle_unknown_item_errors() {
        let mut gate = ChecklistGate::open();
        assert!(gate.toggle("mop-floor").is_err());
    }
}

use serde::Deserialize;

/// One record from the provider's time-slots endpoint. Values live for a
/// single run and are never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub slot_type: String,
    pub slots_count: i64,
    pub client_date: String,
    pub client_time: String,
    #[serde(default)]
    pub available_slots: Option<i64>,
    #[serde(default)]
    pub total_slots: Option<i64>,
}

impl TimeSlot {
    /// A slot is bookable unless the provider marked it busy.
    pub fn is_free(&self) -> bool {
        self.slot_type != "busy"
    }
}

use crashmark::types::DescriptionEntry;
use facet::Facet;

/// Last marker seen on one command-list context at the time of the crash.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub context: u64,
    pub command_list: String,
    pub markers_set: u64,
    /// App-managed token, when the last marker was one.
    pub token: Option<u64>,
    /// Marker text: copied for inline markers, resolved for tokens.
    pub text: Option<String>,
}

/// The simulated crash dump.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct SimDump {
    pub application_name: String,
    pub application_version: String,
    pub user_defined: Vec<DescriptionEntry>,
    pub device: Option<String>,
    pub feature_bits: u32,
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl SimDump {
    pub fn to_json(&self) -> Result<Vec<u8>, String> {
        facet_json::to_vec(self).map_err(|e| e.to_string())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        facet_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

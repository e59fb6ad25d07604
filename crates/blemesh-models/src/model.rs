//! Model instances and node composition
//!
//! A [`Composition`] is fixed when the node is defined: elements, their models,
//! and for every client model its [`ClientState`] and opcode pair table. Nothing
//! in it is added or removed afterwards.

use std::fmt;
use std::sync::Arc;

use blemesh_core::{MeshError, Result};

use crate::client::ClientState;
use crate::op_pair::OpcodePairTable;

/// SIG model identifiers used by the standard client models
pub mod sig {
    pub const CONFIG_SRV: u16 = 0x0000;
    pub const CONFIG_CLI: u16 = 0x0001;
    pub const HEALTH_SRV: u16 = 0x0002;
    pub const HEALTH_CLI: u16 = 0x0003;
    pub const GEN_ONOFF_SRV: u16 = 0x1000;
    pub const GEN_ONOFF_CLI: u16 = 0x1001;
    pub const GEN_LEVEL_CLI: u16 = 0x1003;
    pub const GEN_DEF_TRANS_TIME_CLI: u16 = 0x1005;
    pub const GEN_POWER_ONOFF_CLI: u16 = 0x1008;
    pub const GEN_POWER_LEVEL_CLI: u16 = 0x100B;
    pub const GEN_BATTERY_CLI: u16 = 0x100C;
    pub const SENSOR_CLI: u16 = 0x1102;
    pub const LIGHT_LIGHTNESS_CLI: u16 = 0x1302;
    pub const LIGHT_CTL_CLI: u16 = 0x1305;
    pub const LIGHT_HSL_CLI: u16 = 0x1309;
    pub const LIGHT_XYL_CLI: u16 = 0x130E;
    pub const LIGHT_LC_CLI: u16 = 0x1311;
}

/// Position of a model in the composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId {
    /// Element index
    pub element: u8,
    /// Model index within the element
    pub index: u8,
}

impl ModelId {
    pub const fn new(element: u8, index: u8) -> Self {
        Self { element, index }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.element, self.index)
    }
}

/// SIG or vendor model identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelIdentifier {
    /// Bluetooth SIG model
    Sig(u16),
    /// Vendor model
    Vendor {
        /// Company identifier
        company: u16,
        /// Vendor-assigned model id
        id: u16,
    },
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelIdentifier::Sig(id) => write!(f, "sig:0x{:04X}", id),
            ModelIdentifier::Vendor { company, id } => {
                write!(f, "vnd:0x{:04X}:0x{:04X}", company, id)
            }
        }
    }
}

/// Application callback group a model reports to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Provisioning and node lifecycle
    Prov,
    /// User-defined models
    Model,
    ConfigClient,
    HealthClient,
    GenericClient,
    LightingClient,
    SensorClient,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::Prov => "prov",
            Subsystem::Model => "model",
            Subsystem::ConfigClient => "config_client",
            Subsystem::HealthClient => "health_client",
            Subsystem::GenericClient => "generic_client",
            Subsystem::LightingClient => "lighting_client",
            Subsystem::SensorClient => "sensor_client",
        };
        f.write_str(name)
    }
}

/// Client or server side of a model
#[derive(Debug, Clone)]
pub enum ModelKind {
    Client(Arc<ClientState>),
    Server,
}

/// One model instance
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    identifier: ModelIdentifier,
    subsystem: Subsystem,
    kind: ModelKind,
}

impl Model {
    /// Client model tracking requests with `table`
    pub fn client(
        identifier: ModelIdentifier,
        subsystem: Subsystem,
        table: OpcodePairTable,
    ) -> Self {
        Self {
            id: ModelId::new(0, 0),
            identifier,
            subsystem,
            kind: ModelKind::Client(Arc::new(ClientState::new(table))),
        }
    }

    /// Server model; inbound messages go to the application as operations
    pub fn server(identifier: ModelIdentifier) -> Self {
        Self {
            id: ModelId::new(0, 0),
            identifier,
            subsystem: Subsystem::Model,
            kind: ModelKind::Server,
        }
    }

    /// Generic OnOff client
    pub fn generic_onoff_client() -> Self {
        Self::client(
            ModelIdentifier::Sig(sig::GEN_ONOFF_CLI),
            Subsystem::GenericClient,
            OpcodePairTable::generic(),
        )
    }

    /// Configuration client
    pub fn config_client() -> Self {
        Self::client(
            ModelIdentifier::Sig(sig::CONFIG_CLI),
            Subsystem::ConfigClient,
            OpcodePairTable::config(),
        )
    }

    /// Health client
    pub fn health_client() -> Self {
        Self::client(
            ModelIdentifier::Sig(sig::HEALTH_CLI),
            Subsystem::HealthClient,
            OpcodePairTable::health(),
        )
    }

    /// Light Lightness client
    pub fn light_lightness_client() -> Self {
        Self::client(
            ModelIdentifier::Sig(sig::LIGHT_LIGHTNESS_CLI),
            Subsystem::LightingClient,
            OpcodePairTable::lighting(),
        )
    }

    /// Sensor client
    pub fn sensor_client() -> Self {
        Self::client(
            ModelIdentifier::Sig(sig::SENSOR_CLI),
            Subsystem::SensorClient,
            OpcodePairTable::sensor(),
        )
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn identifier(&self) -> ModelIdentifier {
        self.identifier
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    /// Client state, if this is a client model
    pub fn client_state(&self) -> Option<&Arc<ClientState>> {
        match &self.kind {
            ModelKind::Client(state) => Some(state),
            ModelKind::Server => None,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self.kind, ModelKind::Client(_))
    }
}

/// An element and the models it hosts
#[derive(Debug, Clone, Default)]
pub struct Element {
    /// GATT location descriptor
    pub location: u16,
    models: Vec<Model>,
}

impl Element {
    pub fn new(location: u16) -> Self {
        Self {
            location,
            models: Vec::new(),
        }
    }

    /// Add a model
    pub fn with_model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }
}

/// Number of distinct element or model indices
const MAX_INDICES: usize = u8::MAX as usize + 1;

/// Elements and models of the local node
#[derive(Debug, Clone, Default)]
pub struct Composition {
    elements: Vec<Element>,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, assigning ids to its models
    ///
    /// Element and model indices are 8-bit; a 257th element, or an element
    /// holding more than 256 models, is rejected.
    pub fn with_element(mut self, mut element: Element) -> Result<Self> {
        let element_idx = u8::try_from(self.elements.len()).map_err(|_| {
            MeshError::InvalidArgument(format!("more than {} elements", MAX_INDICES))
        })?;
        for (index, model) in element.models.iter_mut().enumerate() {
            let index = u8::try_from(index).map_err(|_| {
                MeshError::InvalidArgument(format!(
                    "element {} has more than {} models",
                    element_idx, MAX_INDICES
                ))
            })?;
            model.id = ModelId::new(element_idx, index);
        }
        self.elements.push(element);
        Ok(self)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Look up a model
    pub fn model(&self, id: ModelId) -> Result<&Model> {
        self.elements
            .get(id.element as usize)
            .and_then(|e| e.models.get(id.index as usize))
            .ok_or(MeshError::UnknownModel {
                element: id.element,
                index: id.index,
            })
    }

    /// Look up a client model's state
    pub fn client(&self, id: ModelId) -> Result<&Arc<ClientState>> {
        let model = self.model(id)?;
        model
            .client_state()
            .ok_or_else(|| MeshError::Unsupported(format!("model {} is not a client", id)))
    }

    /// Every model, in element order
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.elements.iter().flat_map(|e| e.models.iter())
    }

    /// Every client model
    pub fn clients(&self) -> impl Iterator<Item = (&Model, &Arc<ClientState>)> {
        self.models()
            .filter_map(|m| m.client_state().map(|state| (m, state)))
    }
}

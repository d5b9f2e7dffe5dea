//! I/O 支持：网定义的 JSON、RON 序列化接口。
use std::fs;
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::core::{Net, NetBuilder, NetError};
use crate::net::structure::{Node, Place, Weight};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid net: {0}")]
    Net(#[from] NetError),
    #[error("unsupported net format `{0}` (expected .json or .ron)")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceDef {
    pub name: String,
    #[serde(default)]
    pub capacity: Weight,
    #[serde(default)]
    pub tokens: Weight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcDef {
    pub head: String,
    pub tail: String,
}

/// 按名称描述的网，即磁盘上的存储格式
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDefinition {
    pub places: Vec<PlaceDef>,
    pub transitions: Vec<String>,
    #[serde(default)]
    pub arcs: Vec<ArcDef>,
}

impl NetDefinition {
    pub fn build(&self) -> Result<Net, NetError> {
        let mut builder = NetBuilder::new();
        for place in &self.places {
            builder = builder.place(Place::new_with_tokens_and_capacity(
                place.name.clone(),
                place.tokens,
                place.capacity,
            ));
        }
        for transition in &self.transitions {
            builder = builder.transition(transition.clone());
        }
        for arc in &self.arcs {
            builder = builder.arc(arc.head.clone(), arc.tail.clone());
        }
        builder.build()
    }
}

impl Net {
    pub fn definition(&self) -> NetDefinition {
        let name = |node: Node| match node {
            Node::Place(place) => self.places()[place].name.clone(),
            Node::Transition(transition) => {
                self.transitions()[transition].name.clone()
            }
        };
        NetDefinition {
            places: self
                .places()
                .iter()
                .map(|place| PlaceDef {
                    name: place.name.clone(),
                    capacity: place.capacity,
                    tokens: place.tokens,
                })
                .collect(),
            transitions: self.transitions().iter().map(|t| t.name.clone()).collect(),
            arcs: self
                .arcs()
                .iter()
                .map(|arc| ArcDef {
                    head: name(arc.head),
                    tail: name(arc.tail),
                })
                .collect(),
        }
    }
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(ron::ser::to_string_pretty(value, PrettyConfig::default())?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    fs::write(path, to_json_string(value)?)?;
    Ok(())
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    from_json_str(&fs::read_to_string(path)?)
}

pub fn write_ron<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    fs::write(path, to_ron_string(value)?)?;
    Ok(())
}

pub fn read_ron<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    from_ron_str(&fs::read_to_string(path)?)
}

/// 读取网定义，按文件扩展名选择格式
pub fn read_net<P: AsRef<Path>>(path: P) -> Result<Net, IoError> {
    let path = path.as_ref();
    let definition: NetDefinition = match extension(path).as_str() {
        "json" => read_json(path)?,
        "ron" => read_ron(path)?,
        other => return Err(IoError::UnsupportedFormat(other.to_string())),
    };
    Ok(definition.build()?)
}

pub fn write_net<P: AsRef<Path>>(path: P, net: &Net) -> Result<(), IoError> {
    let path = path.as_ref();
    let definition = net.definition();
    match extension(path).as_str() {
        "json" => write_json(path, &definition),
        "ron" => write_ron(path, &definition),
        other => Err(IoError::UnsupportedFormat(other.to_string())),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

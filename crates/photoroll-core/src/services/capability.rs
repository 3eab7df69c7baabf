//! 处理参数的能力查询
//!
//! 参数块 (`raw_parameters`) 对目录而言是不透明的字节序列，只有产生它的
//! 处理模块知道布局。模块按名称注册一个 [`ParamIntrospect`]，调用方按名称
//! 解析一次后即可按字段名读取参数。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// RAW 导入模块名
pub const RAW_IMPORT: &str = "raw_import";

/// 参数字段值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ParamValue {
    Int(i32),
    Bool(bool),
    Float(f32),
}

/// 参数字段描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamField {
    pub name: &'static str,
    /// 在参数块中的字节偏移
    pub offset: usize,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Bool,
    Float,
}

impl ParamField {
    /// 从参数块读取该字段（小端 4 字节）
    pub fn read(&self, blob: &[u8]) -> Option<ParamValue> {
        let bytes: [u8; 4] = blob.get(self.offset..self.offset + 4)?.try_into().ok()?;
        Some(match self.kind {
            ParamKind::Int => ParamValue::Int(i32::from_le_bytes(bytes)),
            ParamKind::Bool => ParamValue::Bool(i32::from_le_bytes(bytes) != 0),
            ParamKind::Float => ParamValue::Float(f32::from_le_bytes(bytes)),
        })
    }
}

/// 参数块内省
pub trait ParamIntrospect: Send + Sync {
    /// 产生参数块的模块名
    fn name(&self) -> &str;

    /// 参数块中的所有字段
    fn fields(&self) -> &[ParamField];

    /// 按字段名读取；字段不存在或参数块过短时返回 None
    fn get_field(&self, blob: &[u8], field: &str) -> Option<ParamValue> {
        self.fields()
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.read(blob))
    }
}

/// RAW 导入参数：`user_flip`, `wb_auto`, `highlight_mode`, `demosaic`
#[derive(Debug, Default)]
pub struct RawImportParams;

const RAW_IMPORT_FIELDS: &[ParamField] = &[
    ParamField {
        name: "user_flip",
        offset: 0,
        kind: ParamKind::Int,
    },
    ParamField {
        name: "wb_auto",
        offset: 4,
        kind: ParamKind::Bool,
    },
    ParamField {
        name: "highlight_mode",
        offset: 8,
        kind: ParamKind::Int,
    },
    ParamField {
        name: "demosaic",
        offset: 12,
        kind: ParamKind::Int,
    },
];

impl RawImportParams {
    /// 按字段顺序打包参数块
    pub fn pack(user_flip: i32, wb_auto: bool, highlight_mode: i32, demosaic: i32) -> Vec<u8> {
        [user_flip, wb_auto as i32, highlight_mode, demosaic]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

impl ParamIntrospect for RawImportParams {
    fn name(&self) -> &str {
        RAW_IMPORT
    }

    fn fields(&self) -> &[ParamField] {
        RAW_IMPORT_FIELDS
    }
}

/// 处理模块注册表
pub struct CapabilityRegistry {
    producers: RwLock<HashMap<String, Arc<dyn ParamIntrospect>>>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// 创建注册表，内置 RAW 导入模块
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(Arc::new(RawImportParams));
        registry
    }

    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            producers: RwLock::new(HashMap::new()),
        }
    }

    /// 注册模块；同名模块被替换
    pub fn register(&self, producer: Arc<dyn ParamIntrospect>) {
        let name = producer.name().to_string();
        tracing::debug!("registered parameter producer {}", name);
        self.producers.write().insert(name, producer);
    }

    /// 按名称解析模块
    pub fn resolve_capability(&self, name: &str) -> Option<Arc<dyn ParamIntrospect>> {
        self.producers.read().get(name).cloned()
    }

    /// 已注册的模块名（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.producers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

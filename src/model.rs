//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了领域记录、缓存镜像和脏索引的数据模型。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 记录的可写字段
///
/// 未设置的字段在序列化时省略，写入后端时为 NULL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UserFields {
    /// 仅设置名称的字段集
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// 领域记录
///
/// 标识符由后端存储在创建时分配，缓存中只保存副本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(flatten)]
    pub fields: UserFields,
}

impl Record {
    pub fn new(id: i64, fields: UserFields) -> Self {
        Self { id, fields }
    }
}

/// 在记录序列中按标识符查找位置
pub fn position_of(records: &[Record], id: i64) -> Option<usize> {
    records.iter().position(|r| r.id == id)
}

/// 一条暂存的回写更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUpdate {
    pub revision: u64,
    pub fields: UserFields,
}

/// 脏索引
///
/// 以稳定的记录标识符为键，保存尚未落盘的字段和修订号。
/// 落盘只依赖这里的字段，与缓存镜像是否被淘汰或重建无关。
/// 每次暂存都会递增修订号，对账时只移除修订号未变化的条目，
/// 因此在对账进行期间到达的更新会留待下一轮处理。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirtyIndex {
    entries: BTreeMap<i64, StagedUpdate>,
}

impl DirtyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存记录的最新字段，返回新的修订号
    pub fn stage(&mut self, id: i64, fields: UserFields) -> u64 {
        match self.entries.get_mut(&id) {
            Some(staged) => {
                staged.revision += 1;
                staged.fields = fields;
                staged.revision
            }
            None => {
                self.entries.insert(id, StagedUpdate { revision: 1, fields });
                1
            }
        }
    }

    /// 当修订号与快照一致时移除条目
    ///
    /// 返回是否移除
    pub fn clear_if_unchanged(&mut self, id: i64, revision: u64) -> bool {
        if self.revision(id) == Some(revision) {
            self.entries.remove(&id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: i64) -> Option<&StagedUpdate> {
        self.entries.get(&id)
    }

    pub fn revision(&self, id: i64) -> Option<u64> {
        self.entries.get(&id).map(|staged| staged.revision)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// 按标识符升序迭代
    pub fn iter(&self) -> impl Iterator<Item = (i64, &StagedUpdate)> + '_ {
        self.entries.iter().map(|(id, staged)| (*id, staged))
    }

    pub fn ids(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    /// 把暂存字段覆盖到记录序列上，返回覆盖的条数
    ///
    /// 从后端重建镜像时使用，使尚未落盘的更新保持可见
    pub fn overlay(&self, records: &mut [Record]) -> usize {
        let mut applied = 0;
        for record in records.iter_mut() {
            if let Some(staged) = self.entries.get(&record.id) {
                record.fields = staged.fields.clone();
                applied += 1;
            }
        }
        applied
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

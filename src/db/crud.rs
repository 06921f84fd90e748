use sqlx::{Executor, Result, Sqlite};

use super::{ItemRow, encode_embedding};
use crate::types::ItemRecord;

/// 写入条目，ID 已存在时替换并分配新的序号
pub async fn upsert_item<'c, E>(executor: E, record: &ItemRecord) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let vector = encode_embedding(&record.embedding);
    let dim = record.embedding.len() as i64;
    let seq: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO item (id, seq, dim, vector, source, created_at)
        VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM item), ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            seq = excluded.seq,
            dim = excluded.dim,
            vector = excluded.vector,
            source = excluded.source,
            created_at = excluded.created_at
        RETURNING seq
        "#,
    )
    .bind(&record.id)
    .bind(dim)
    .bind(vector)
    .bind(&record.source)
    .bind(record.created_at)
    .fetch_one(executor)
    .await?;

    Ok(seq.0)
}

/// 删除条目，返回其是否存在
pub async fn delete_item<'c, E>(executor: E, id: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM item WHERE id = ?").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_item<'c, E>(executor: E, id: &str) -> Result<Option<ItemRow>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as("SELECT id, seq, dim, vector, source, created_at FROM item WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// 按写入顺序获取所有条目
pub async fn all_items<'c, E>(executor: E) -> Result<Vec<ItemRow>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as("SELECT id, seq, dim, vector, source, created_at FROM item ORDER BY seq ASC")
        .fetch_all(executor)
        .await
}

pub async fn count_items<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM item").fetch_one(executor).await?;
    Ok(count.0)
}

/// 数据库中出现过的所有向量维度
pub async fn stored_dims<'c, E>(executor: E) -> Result<Vec<i64>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let dims: Vec<(i64,)> =
        sqlx::query_as("SELECT DISTINCT dim FROM item").fetch_all(executor).await?;
    Ok(dims.into_iter().map(|d| d.0).collect())
}

use sqlx::{Executor, Result, Sqlite};

use super::DocumentRecord;

/// 按 ID 顺序获取所有文档
pub async fn get_documents<'c, E>(executor: E) -> Result<Vec<DocumentRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, DocumentRecord>(
        r#"
        SELECT id, content, content_type, meta, embedding
        FROM document
        ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 插入或更新文档
pub async fn upsert_document<'c, E>(executor: E, record: &DocumentRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO document (id, content, content_type, meta, embedding)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            content = excluded.content,
            content_type = excluded.content_type,
            meta = excluded.meta,
            embedding = excluded.embedding
        "#,
    )
    .bind(record.id)
    .bind(&record.content)
    .bind(&record.content_type)
    .bind(&record.meta)
    .bind(&record.embedding)
    .execute(executor)
    .await?;

    Ok(())
}

/// 删除文档，ID 不存在时不报错
pub async fn delete_document<'c, E>(executor: E, id: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("DELETE FROM document WHERE id = ?").bind(id).execute(executor).await?;
    Ok(())
}

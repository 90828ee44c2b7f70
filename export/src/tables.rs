//! Parquet writers for the three exported tables.
//!
//! Flat schemas written column-wise through the low-level file writer;
//! `topics` is the one LIST column and gets explicit definition and
//! repetition levels.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::basic::{Compression, ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::schema::types::{Type, TypePtr};

use crate::Result;
use crate::rows::{FileRow, HistoryRow, RepoRow};

fn utf8_field(name: &str, repetition: Repetition) -> Result<TypePtr> {
    let field = Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
        .with_converted_type(ConvertedType::UTF8)
        .with_repetition(repetition)
        .build()?;
    Ok(Arc::new(field))
}

fn int64_field(name: &str) -> Result<TypePtr> {
    let field = Type::primitive_type_builder(name, PhysicalType::INT64)
        .with_repetition(Repetition::OPTIONAL)
        .build()?;
    Ok(Arc::new(field))
}

/// `optional group <name> (LIST) { repeated group list { required binary element (UTF8) } }`
fn string_list_field(name: &str) -> Result<TypePtr> {
    let element = utf8_field("element", Repetition::REQUIRED)?;
    let list = Type::group_type_builder("list")
        .with_repetition(Repetition::REPEATED)
        .with_fields(vec![element])
        .build()?;
    let group = Type::group_type_builder(name)
        .with_converted_type(ConvertedType::LIST)
        .with_repetition(Repetition::OPTIONAL)
        .with_fields(vec![Arc::new(list)])
        .build()?;
    Ok(Arc::new(group))
}

fn open_writer(path: &Path, fields: Vec<TypePtr>) -> Result<SerializedFileWriter<File>> {
    let schema = Type::group_type_builder("schema")
        .with_fields(fields)
        .build()?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(path)?;
    Ok(SerializedFileWriter::new(
        file,
        Arc::new(schema),
        Arc::new(properties),
    )?)
}

fn write_required_strings(column: &mut SerializedColumnWriter<'_>, values: &[&str]) -> Result<()> {
    let data: Vec<ByteArray> = values.iter().map(|value| ByteArray::from(*value)).collect();
    column
        .typed::<ByteArrayType>()
        .write_batch(&data, None, None)?;
    Ok(())
}

fn write_optional_strings(
    column: &mut SerializedColumnWriter<'_>,
    values: &[Option<&str>],
) -> Result<()> {
    let def_levels: Vec<i16> = values.iter().map(|value| i16::from(value.is_some())).collect();
    let data: Vec<ByteArray> = values
        .iter()
        .flatten()
        .map(|value| ByteArray::from(*value))
        .collect();
    column
        .typed::<ByteArrayType>()
        .write_batch(&data, Some(&def_levels), None)?;
    Ok(())
}

fn write_optional_i64(
    column: &mut SerializedColumnWriter<'_>,
    values: &[Option<i64>],
) -> Result<()> {
    let def_levels: Vec<i16> = values.iter().map(|value| i16::from(value.is_some())).collect();
    let data: Vec<i64> = values.iter().flatten().copied().collect();
    column
        .typed::<Int64Type>()
        .write_batch(&data, Some(&def_levels), None)?;
    Ok(())
}

/// Definition levels for the LIST column: 0 = null list, 1 = empty list,
/// 2 = element present. Repetition level 0 starts a new row.
fn write_string_lists(
    column: &mut SerializedColumnWriter<'_>,
    values: &[Option<&[String]>],
) -> Result<()> {
    let mut def_levels = Vec::new();
    let mut rep_levels = Vec::new();
    let mut data = Vec::new();
    for value in values {
        match value {
            None => {
                def_levels.push(0);
                rep_levels.push(0);
            }
            Some(items) if items.is_empty() => {
                def_levels.push(1);
                rep_levels.push(0);
            }
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    def_levels.push(2);
                    rep_levels.push(i16::from(index > 0));
                    data.push(ByteArray::from(item.as_str()));
                }
            }
        }
    }
    column
        .typed::<ByteArrayType>()
        .write_batch(&data, Some(&def_levels), Some(&rep_levels))?;
    Ok(())
}

/// Apply `write` to the next column of the row group, which must exist.
fn next_column<F>(
    row_group: &mut parquet::file::writer::SerializedRowGroupWriter<'_, File>,
    write: F,
) -> Result<()>
where
    F: FnOnce(&mut SerializedColumnWriter<'_>) -> Result<()>,
{
    let mut column = row_group.next_column()?.ok_or_else(|| {
        parquet::errors::ParquetError::General("schema/column count mismatch".to_string())
    })?;
    write(&mut column)?;
    column.close()?;
    Ok(())
}

/// Write `files.parquet`.
pub fn write_files(path: &Path, files: &[FileRow]) -> Result<()> {
    let fields = vec![
        utf8_field("url", Repetition::REQUIRED)?,
        utf8_field("sha", Repetition::OPTIONAL)?,
        int64_field("size_bytes")?,
        utf8_field("discovered_at", Repetition::OPTIONAL)?,
        utf8_field("repo_key", Repetition::OPTIONAL)?,
        utf8_field("filename", Repetition::OPTIONAL)?,
        utf8_field("path", Repetition::OPTIONAL)?,
    ];
    let mut writer = open_writer(path, fields)?;
    let mut row_group = writer.next_row_group()?;

    let urls: Vec<&str> = files.iter().map(|f| f.url.as_str()).collect();
    next_column(&mut row_group, |c| write_required_strings(c, &urls))?;
    let shas: Vec<Option<&str>> = files.iter().map(|f| f.sha.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &shas))?;
    let sizes: Vec<Option<i64>> = files.iter().map(|f| f.size_bytes).collect();
    next_column(&mut row_group, |c| write_optional_i64(c, &sizes))?;
    let discovered: Vec<Option<&str>> = files.iter().map(|f| f.discovered_at.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &discovered))?;
    let repo_keys: Vec<Option<&str>> = files.iter().map(|f| f.repo_key.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &repo_keys))?;
    let filenames: Vec<Option<&str>> = files.iter().map(|f| f.filename.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &filenames))?;
    let paths: Vec<Option<&str>> = files.iter().map(|f| f.path.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &paths))?;

    row_group.close()?;
    writer.close()?;
    Ok(())
}

/// Write `repos.parquet`.
pub fn write_repos(path: &Path, repos: &[RepoRow]) -> Result<()> {
    let fields = vec![
        utf8_field("repo_key", Repetition::REQUIRED)?,
        utf8_field("repo_owner", Repetition::REQUIRED)?,
        utf8_field("repo_name", Repetition::REQUIRED)?,
        int64_field("stars")?,
        int64_field("forks")?,
        int64_field("watchers")?,
        utf8_field("language", Repetition::OPTIONAL)?,
        string_list_field("topics")?,
        utf8_field("description", Repetition::OPTIONAL)?,
        utf8_field("license", Repetition::OPTIONAL)?,
        utf8_field("created_at", Repetition::OPTIONAL)?,
        utf8_field("updated_at", Repetition::OPTIONAL)?,
    ];
    let mut writer = open_writer(path, fields)?;
    let mut row_group = writer.next_row_group()?;

    let keys: Vec<&str> = repos.iter().map(|r| r.repo_key.as_str()).collect();
    next_column(&mut row_group, |c| write_required_strings(c, &keys))?;
    let owners: Vec<&str> = repos.iter().map(|r| r.repo_owner.as_str()).collect();
    next_column(&mut row_group, |c| write_required_strings(c, &owners))?;
    let names: Vec<&str> = repos.iter().map(|r| r.repo_name.as_str()).collect();
    next_column(&mut row_group, |c| write_required_strings(c, &names))?;
    let stars: Vec<Option<i64>> = repos.iter().map(|r| r.stars).collect();
    next_column(&mut row_group, |c| write_optional_i64(c, &stars))?;
    let forks: Vec<Option<i64>> = repos.iter().map(|r| r.forks).collect();
    next_column(&mut row_group, |c| write_optional_i64(c, &forks))?;
    let watchers: Vec<Option<i64>> = repos.iter().map(|r| r.watchers).collect();
    next_column(&mut row_group, |c| write_optional_i64(c, &watchers))?;
    let languages: Vec<Option<&str>> = repos.iter().map(|r| r.language.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &languages))?;
    let topics: Vec<Option<&[String]>> = repos.iter().map(|r| r.topics.as_deref()).collect();
    next_column(&mut row_group, |c| write_string_lists(c, &topics))?;
    let descriptions: Vec<Option<&str>> = repos.iter().map(|r| r.description.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &descriptions))?;
    let licenses: Vec<Option<&str>> = repos.iter().map(|r| r.license.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &licenses))?;
    let created: Vec<Option<&str>> = repos.iter().map(|r| r.created_at.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &created))?;
    let updated: Vec<Option<&str>> = repos.iter().map(|r| r.updated_at.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &updated))?;

    row_group.close()?;
    writer.close()?;
    Ok(())
}

/// Write `history.parquet`.
pub fn write_history(path: &Path, history: &[HistoryRow]) -> Result<()> {
    let fields = vec![
        utf8_field("url", Repetition::REQUIRED)?,
        utf8_field("commit_sha", Repetition::OPTIONAL)?,
        utf8_field("commit_author", Repetition::OPTIONAL)?,
        utf8_field("commit_date", Repetition::OPTIONAL)?,
        utf8_field("commit_message", Repetition::OPTIONAL)?,
    ];
    let mut writer = open_writer(path, fields)?;
    let mut row_group = writer.next_row_group()?;

    let urls: Vec<&str> = history.iter().map(|h| h.url.as_str()).collect();
    next_column(&mut row_group, |c| write_required_strings(c, &urls))?;
    let shas: Vec<Option<&str>> = history.iter().map(|h| h.commit_sha.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &shas))?;
    let authors: Vec<Option<&str>> = history.iter().map(|h| h.commit_author.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &authors))?;
    let dates: Vec<Option<&str>> = history.iter().map(|h| h.commit_date.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &dates))?;
    let messages: Vec<Option<&str>> = history.iter().map(|h| h.commit_message.as_deref()).collect();
    next_column(&mut row_group, |c| write_optional_strings(c, &messages))?;

    row_group.close()?;
    writer.close()?;
    Ok(())
}

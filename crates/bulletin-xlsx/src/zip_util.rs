use std::io::Read;

use zip::read::ZipFile;

use crate::XlsxError;

fn normalized_part_name(name: &str) -> impl Iterator<Item = u8> + '_ {
    name.bytes()
        .skip_while(|b| matches!(b, b'/' | b'\\'))
        .map(|b| if b == b'\\' { b'/' } else { b.to_ascii_lowercase() })
}

/// Whether two part names denote the same part, ignoring leading separators, `\` vs `/` and
/// ASCII case.
pub(crate) fn zip_part_names_equivalent(a: &str, b: &str) -> bool {
    normalized_part_name(a).eq(normalized_part_name(b))
}

/// Running total of inflated bytes across a package load.
#[derive(Debug, Clone)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    pub(crate) fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    pub(crate) fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    fn consume(&mut self, bytes: u64) -> Result<(), XlsxError> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Inflate one entry, refusing to read past the per-part limit or the remaining total budget.
///
/// The declared size in the ZIP header is checked up front but not trusted: reading stops one
/// byte past the limit so forged headers are caught too.
pub(crate) fn read_zip_file_bytes_with_budget(
    file: &mut ZipFile<'_>,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, XlsxError> {
    let declared_size = file.size();
    if declared_size > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_part_bytes,
        });
    }

    let effective_max = max_part_bytes.min(budget.remaining_bytes());
    let mut buf = Vec::new();
    file.take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_part_bytes,
        });
    }
    budget.consume(observed)?;
    Ok(buf)
}

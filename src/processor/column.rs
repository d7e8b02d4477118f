use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    Float64,
    Str,
}

/// Dictionary-encoded string column. Codes are handed out in first-occurrence
/// order, so iterating the dictionary replays the order values were first seen.
#[derive(Debug, Clone, Default)]
pub struct StrColumn {
    dictionary: Vec<String>,
    lookup: HashMap<String, u32>,
    codes: Vec<Vec<u32>>,
}

impl StrColumn {
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(&code) = self.lookup.get(value) {
            return code;
        }
        let code = self.dictionary.len() as u32;
        self.dictionary.push(value.to_string());
        self.lookup.insert(value.to_string(), code);
        code
    }
}

#[derive(Debug, Clone)]
pub enum Column {
    /// Days since 0001-01-01 (chrono's `num_days_from_ce`)
    Date(Vec<Vec<i64>>),
    /// `NaN` marks a missing value
    Float64(Vec<Vec<f64>>),
    Str(StrColumn),
}

impl Column {
    pub fn new(col_type: ColumnType) -> Self {
        match col_type {
            ColumnType::Date => Column::Date(Vec::new()),
            ColumnType::Float64 => Column::Float64(Vec::new()),
            ColumnType::Str => Column::Str(StrColumn::default()),
        }
    }

    pub fn push_chunk_date(&mut self, chunk: Vec<i64>) {
        match self {
            Column::Date(chunks) => chunks.push(chunk),
            _ => panic!("Type mismatch"),
        }
    }

    pub fn push_chunk_f64(&mut self, chunk: Vec<f64>) {
        match self {
            Column::Float64(chunks) => chunks.push(chunk),
            _ => panic!("Type mismatch"),
        }
    }

    /// Interns every value of the chunk and appends the resulting codes.
    pub fn push_chunk_str<S: AsRef<str>>(&mut self, chunk: &[S]) {
        if let Column::Str(col) = self {
            let codes = chunk.iter().map(|v| col.intern(v.as_ref())).collect();
            col.codes.push(codes);
        } else {
            panic!("Wrong type")
        }
    }

    // Contiguous access, valid once the column is flat

    pub fn dates(&self) -> &[i64] {
        match self {
            Column::Date(chunks) => first_chunk(chunks),
            _ => panic!("Wrong type"),
        }
    }

    pub fn values_f64(&self) -> &[f64] {
        match self {
            Column::Float64(chunks) => first_chunk(chunks),
            _ => panic!("Wrong type"),
        }
    }

    pub fn codes(&self) -> &[u32] {
        match self {
            Column::Str(col) => first_chunk(&col.codes),
            _ => panic!("Wrong type"),
        }
    }

    pub fn dictionary(&self) -> &[String] {
        match self {
            Column::Str(col) => &col.dictionary,
            _ => panic!("Wrong type"),
        }
    }

    /// Code of a value, `None` if the value never occurs in the column.
    pub fn code_of(&self, value: &str) -> Option<u32> {
        match self {
            Column::Str(col) => col.lookup.get(value).copied(),
            _ => panic!("Wrong type"),
        }
    }

    pub fn flatten_in_place(&mut self) {
        match self {
            Column::Date(chunks) => flatten_chunks(chunks),
            Column::Float64(chunks) => flatten_chunks(chunks),
            Column::Str(col) => flatten_chunks(&mut col.codes),
        }
    }
}

fn first_chunk<T>(chunks: &[Vec<T>]) -> &[T] {
    debug_assert!(chunks.len() <= 1, "column must be flattened first");
    chunks.first().map(|c| c.as_slice()).unwrap_or(&[])
}

fn flatten_chunks<T>(chunks: &mut Vec<Vec<T>>) {
    if chunks.len() <= 1 {
        return; // Already flat
    }

    // Take ownership of chunks, leaving empty vec
    let mut owned_chunks = std::mem::take(chunks);

    // The first chunk is already allocated, grow it in place
    let mut flattened = owned_chunks.remove(0);
    let total: usize = owned_chunks.iter().map(|c| c.len()).sum();
    flattened.reserve(total);

    for chunk in owned_chunks {
        flattened.extend(chunk);
    }

    chunks.push(flattened);
}

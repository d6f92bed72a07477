use crate::{
    disassembler::resolve_offset,
    document::{ExceptionRegion, ExceptionRegionKind, InstructionId, MethodBody},
    import::{ImportContext, ImportKind, ReferenceImporter},
    live::LiveExceptionClause,
    metadata::flags::ExceptionHandlerFlags,
    Result,
};

/// Rebuild the protected regions of `body` from flat byte-offset clauses.
///
/// `body.instructions` must already be decoded. Every start offset has to land on an
/// instruction; an end offset may additionally be exactly the code size, which yields an open
/// end.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for boundaries that do not fall on an instruction, for
/// regions whose end precedes their start, and for catch clauses without a type.
pub fn decode_regions(
    clauses: &[LiveExceptionClause],
    body: &MethodBody,
    importer: &mut ReferenceImporter,
    context: &ImportContext,
) -> Result<Vec<ExceptionRegion>> {
    let offsets: Vec<u32> = body.instructions.iter().map(|i| i.offset).collect();
    let code_size = body.code_size();

    let mut regions = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let kind = clause_kind(clause.flags)?;

        let try_end_offset = end_offset(clause.try_offset, clause.try_length)?;
        let handler_end_offset = end_offset(clause.handler_offset, clause.handler_length)?;
        if try_end_offset <= clause.try_offset {
            return Err(malformed_error!(
                "Empty protected block at IL_{:04x}",
                clause.try_offset
            ));
        }
        if handler_end_offset <= clause.handler_offset {
            return Err(malformed_error!(
                "Empty handler block at IL_{:04x}",
                clause.handler_offset
            ));
        }

        if try_end_offset > clause.handler_offset {
            return Err(malformed_error!(
                "Handler at IL_{:04x} starts inside its protected block",
                clause.handler_offset
            ));
        }

        let filter_start = if kind == ExceptionRegionKind::Filter {
            if clause.filter_offset < try_end_offset || clause.filter_offset >= clause.handler_offset {
                return Err(malformed_error!(
                    "Filter at IL_{:04x} is not between its protected block and its handler at IL_{:04x}",
                    clause.filter_offset,
                    clause.handler_offset
                ));
            }
            Some(resolve_offset(&offsets, clause.filter_offset)?)
        } else {
            None
        };

        let catch_type = match (kind, &clause.catch_type) {
            (ExceptionRegionKind::Catch, Some(ty)) => {
                Some(importer.import_type(ty, ImportKind::Open, context)?)
            }
            (ExceptionRegionKind::Catch, None) => {
                return Err(malformed_error!(
                    "Catch clause at IL_{:04x} has no exception type",
                    clause.handler_offset
                ))
            }
            _ => None,
        };

        regions.push(ExceptionRegion {
            kind,
            try_start: resolve_offset(&offsets, clause.try_offset)?,
            try_end: resolve_end(&offsets, code_size, try_end_offset)?,
            filter_start,
            handler_start: resolve_offset(&offsets, clause.handler_offset)?,
            handler_end: resolve_end(&offsets, code_size, handler_end_offset)?,
            catch_type,
        });
    }
    Ok(regions)
}

fn clause_kind(flags: ExceptionHandlerFlags) -> Result<ExceptionRegionKind> {
    if flags.is_empty() {
        Ok(ExceptionRegionKind::Catch)
    } else if flags == ExceptionHandlerFlags::FILTER {
        Ok(ExceptionRegionKind::Filter)
    } else if flags == ExceptionHandlerFlags::FINALLY {
        Ok(ExceptionRegionKind::Finally)
    } else if flags == ExceptionHandlerFlags::FAULT {
        Ok(ExceptionRegionKind::Fault)
    } else {
        Err(malformed_error!(
            "Invalid exception handler flags {:#06x}",
            flags.bits()
        ))
    }
}

fn end_offset(start: u32, length: u32) -> Result<u32> {
    start
        .checked_add(length)
        .ok_or_else(|| malformed_error!("Region IL_{:04x}+{} overflows", start, length))
}

fn resolve_end(offsets: &[u32], code_size: u32, end: u32) -> Result<Option<InstructionId>> {
    if end == code_size {
        return Ok(None);
    }
    resolve_offset(offsets, end).map(Some)
}

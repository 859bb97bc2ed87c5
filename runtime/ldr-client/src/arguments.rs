//! Program argument commands shared by `ldr:shel` and `ldr:dmnt`

use crate::session::{ServiceKind, SessionHolder};
use crate::transport::{BufferAttr, Request, Transport};
use crate::types::ProgramId;
use crate::version::{self, HostVersion};
use crate::{wire, Result};

/// Store `args` for the next launch of `program_id`
///
/// Below 11.0.0 the argument size travels in the payload header; from
/// 11.0.0 the server takes it from the attached buffer.
pub(crate) fn set_program_arguments<K: ServiceKind, T: Transport>(
    holder: &SessionHolder<K, T>,
    host: &HostVersion,
    program_id: ProgramId,
    args: &[u8],
) -> Result<()> {
    let format = version::arguments_format(host);
    log::trace!("{}: SetProgramArguments {} as {:?}", K::NAME, program_id, format);

    let data = wire::encode_set_program_arguments(format, program_id, args.len())?;
    let request = Request::new(wire::commands::SET_PROGRAM_ARGUMENTS)
        .with_data(data)
        .with_in_buffer(BufferAttr::HIPC_POINTER, args);

    holder.dispatch(request)?;
    Ok(())
}

/// Apply all stored arguments
pub(crate) fn flush_arguments<K: ServiceKind, T: Transport>(
    holder: &SessionHolder<K, T>,
) -> Result<()> {
    holder.dispatch(Request::new(wire::commands::FLUSH_ARGUMENTS))?;
    Ok(())
}

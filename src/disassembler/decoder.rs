use crate::{
    config::DecoderConfig,
    disassembler::fallback::{resolve_from_image, ImageTokenResolver},
    document::{
        opcodes::{OpCode, OperandKind, FE_PREFIX, INSTRUCTIONS, INSTRUCTIONS_FE},
        Instruction, InstructionId, MethodBody, Operand,
    },
    file::parser::Parser,
    import::{ImportContext, ImportKind, ReferenceImporter},
    live::{LiveMember, LiveModuleRc, LiveTypeRc},
    metadata::{signatures::decode_method_signature, token::Token},
    Error, Result,
};

/// Branch operand awaiting resolution to an instruction id.
enum PendingBranch {
    Single(usize, u32),
    Switch(usize, Vec<u32>),
}

/// Decodes a raw instruction stream into a [`MethodBody`].
///
/// Operand tokens are resolved through the live module and imported into the importer's
/// document module. Branch operands are collected as absolute byte offsets first and turned
/// into [`InstructionId`]s once the whole stream is known.
pub struct BodyDecoder<'a, 'm> {
    module: &'a LiveModuleRc,
    importer: &'a mut ReferenceImporter<'m>,
    context: &'a ImportContext,
    config: DecoderConfig,
    fallback: Option<&'a dyn ImageTokenResolver>,
    argument_count: Option<usize>,
}

impl<'a, 'm> BodyDecoder<'a, 'm> {
    /// Decoder resolving tokens in `module`.
    pub fn new(
        module: &'a LiveModuleRc,
        importer: &'a mut ReferenceImporter<'m>,
        context: &'a ImportContext,
    ) -> Self {
        BodyDecoder {
            module,
            importer,
            context,
            config: DecoderConfig::default(),
            fallback: None,
            argument_count: None,
        }
    }

    /// Replace the decoder settings.
    #[must_use]
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolver consulted for tokens missing from the live view, if the disk fallback is on.
    #[must_use]
    pub fn with_fallback(mut self, resolver: Option<&'a dyn ImageTokenResolver>) -> Self {
        self.fallback = resolver;
        self
    }

    /// Number of arguments including `this`, enables argument index validation.
    #[must_use]
    pub fn with_argument_count(mut self, count: usize) -> Self {
        self.argument_count = Some(count);
        self
    }

    /// Decode `il` into `body.instructions`.
    ///
    /// `body.variables` must already hold the method's locals if local indices are validated.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for truncated streams, reserved opcodes, misaligned branch
    /// targets and out-of-range variable indices, [`Error::MemberMissing`] for unresolvable
    /// tokens and any error of the importer.
    pub fn decode(&mut self, il: &[u8], body: &mut MethodBody) -> Result<()> {
        if il.len() > self.config.max_code_size {
            return Err(malformed_error!(
                "Code size {} exceeds the limit of {} bytes",
                il.len(),
                self.config.max_code_size
            ));
        }

        let mut parser = Parser::new(il);
        let mut instructions = Vec::new();
        let mut pending = Vec::new();

        while parser.has_more_data() {
            #[allow(clippy::cast_possible_truncation)]
            let offset = parser.pos() as u32;
            let opcode = read_opcode(&mut parser)?;
            let index = instructions.len();

            let operand = match opcode.operand {
                OperandKind::ShortInlineBrTarget => {
                    let delta = i32::from(parser.read_le::<i8>()?);
                    pending.push(PendingBranch::Single(index, branch_target(&parser, delta)?));
                    Operand::None
                }
                OperandKind::InlineBrTarget => {
                    let delta = parser.read_le::<i32>()?;
                    pending.push(PendingBranch::Single(index, branch_target(&parser, delta)?));
                    Operand::None
                }
                OperandKind::InlineSwitch => {
                    let count = parser.read_le::<u32>()? as usize;
                    if count > parser.remaining() / 4 {
                        return Err(malformed_error!(
                            "Switch at IL_{:04x} declares {} targets past the end of the stream",
                            offset,
                            count
                        ));
                    }
                    let mut deltas = Vec::with_capacity(count);
                    for _ in 0..count {
                        deltas.push(parser.read_le::<i32>()?);
                    }
                    let targets = deltas
                        .into_iter()
                        .map(|delta| branch_target(&parser, delta))
                        .collect::<Result<Vec<_>>>()?;
                    pending.push(PendingBranch::Switch(index, targets));
                    Operand::None
                }
                _ => self.decode_operand(opcode, &mut parser, body)?,
            };

            instructions.push(Instruction::new(offset, opcode, operand));
        }

        let offsets: Vec<u32> = instructions.iter().map(|i| i.offset).collect();
        for branch in pending {
            match branch {
                PendingBranch::Single(index, target) => {
                    instructions[index].operand = Operand::Target(resolve_offset(&offsets, target)?);
                }
                PendingBranch::Switch(index, targets) => {
                    let ids = targets
                        .into_iter()
                        .map(|target| resolve_offset(&offsets, target))
                        .collect::<Result<Vec<_>>>()?;
                    instructions[index].operand = Operand::Targets(ids);
                }
            }
        }

        log::trace!(
            "decoded {} instructions from {} bytes of {}",
            instructions.len(),
            il.len(),
            self.module.name
        );
        body.instructions = instructions;
        Ok(())
    }

    fn decode_operand(
        &mut self,
        opcode: &OpCode,
        parser: &mut Parser,
        body: &MethodBody,
    ) -> Result<Operand> {
        Ok(match opcode.operand {
            OperandKind::InlineNone => Operand::None,
            OperandKind::ShortInlineI => Operand::Int8(parser.read_le::<i8>()?),
            OperandKind::InlineI => Operand::Int32(parser.read_le::<i32>()?),
            OperandKind::InlineI8 => Operand::Int64(parser.read_le::<i64>()?),
            OperandKind::ShortInlineR => Operand::Float32(parser.read_le::<f32>()?),
            OperandKind::InlineR => Operand::Float64(parser.read_le::<f64>()?),
            OperandKind::ShortInlineVar => {
                Operand::Local(self.check_local(u16::from(parser.read_le::<u8>()?), body)?)
            }
            OperandKind::InlineVar => Operand::Local(self.check_local(parser.read_le::<u16>()?, body)?),
            OperandKind::ShortInlineArg => {
                Operand::Argument(self.check_argument(u16::from(parser.read_le::<u8>()?))?)
            }
            OperandKind::InlineArg => Operand::Argument(self.check_argument(parser.read_le::<u16>()?)?),
            OperandKind::InlineString => {
                let token = Token::new(parser.read_le::<u32>()?);
                let module = self.module;
                Operand::String(self.or_from_image(module.resolve_string(token), token, |resolver, image| {
                    resolver.resolve_string(image, module, token)
                })?)
            }
            OperandKind::InlineType => {
                let token = Token::new(parser.read_le::<u32>()?);
                let ty = self.resolve_type(token)?;
                Operand::Type(self.importer.import_type(&ty, ImportKind::Open, self.context)?)
            }
            OperandKind::InlineMethod => {
                let token = Token::new(parser.read_le::<u32>()?);
                match self.resolve(token)? {
                    LiveMember::Method(method) => {
                        Operand::Method(self.importer.import_method(&method, self.context)?)
                    }
                    other => return Err(unexpected(token, &other, "method")),
                }
            }
            OperandKind::InlineField => {
                let token = Token::new(parser.read_le::<u32>()?);
                match self.resolve(token)? {
                    LiveMember::Field(field) => {
                        Operand::Field(self.importer.import_field(&field, self.context)?)
                    }
                    other => return Err(unexpected(token, &other, "field")),
                }
            }
            OperandKind::InlineTok => {
                let token = Token::new(parser.read_le::<u32>()?);
                let member = self.resolve(token)?;
                Operand::Token(self.importer.import_member(&member, self.context)?)
            }
            OperandKind::InlineSig => {
                let token = Token::new(parser.read_le::<u32>()?);
                let module = self.module;
                let blob = self.or_from_image(module.resolve_signature(token), token, |resolver, image| {
                    resolver.resolve_signature(image, module, token)
                })?;
                let signature =
                    decode_method_signature::<LiveTypeRc, _>(&blob, |token| self.resolve_type(token))?;
                Operand::CallSite(self.importer.import_call_site(&signature, self.context)?)
            }
            OperandKind::ShortInlineBrTarget
            | OperandKind::InlineBrTarget
            | OperandKind::InlineSwitch => {
                return Err(malformed_error!("Branch operand of {} decoded as a value", opcode))
            }
        })
    }

    fn resolve_type(&self, token: Token) -> Result<LiveTypeRc> {
        match self.resolve(token)? {
            LiveMember::Type(ty) => Ok(ty),
            other => Err(unexpected(token, &other, "type")),
        }
    }

    /// Live lookup, falling back to the on-disk image for tokens the live view lacks.
    fn resolve(&self, token: Token) -> Result<LiveMember> {
        let module = self.module;
        self.or_from_image(module.resolve_member(token), token, |resolver, image| {
            resolver.resolve_token(image, module, token)
        })
    }

    /// Replaces a [`Error::MemberMissing`] result of a live lookup with `lookup` over the mapped
    /// image, when the fallback is enabled and the module has a disk location.
    fn or_from_image<R>(
        &self,
        live: Result<R>,
        token: Token,
        lookup: impl FnOnce(&dyn ImageTokenResolver, &[u8]) -> Result<R>,
    ) -> Result<R> {
        let missing = match live {
            Err(Error::MemberMissing(missing)) => missing,
            other => return other,
        };
        let resolver = match self.fallback {
            Some(resolver) if self.config.disk_fallback => resolver,
            _ => return Err(Error::MemberMissing(missing)),
        };
        match self.module.location() {
            Some(location) => {
                resolve_from_image(self.module, &location, token, |image| lookup(resolver, image))
            }
            None => Err(Error::MemberMissing(missing)),
        }
    }

    fn check_local(&self, index: u16, body: &MethodBody) -> Result<u16> {
        if self.config.validate_operand_indices && usize::from(index) >= body.variables.len() {
            return Err(malformed_error!(
                "Local index {} out of range, the body declares {} locals",
                index,
                body.variables.len()
            ));
        }
        Ok(index)
    }

    fn check_argument(&self, index: u16) -> Result<u16> {
        match self.argument_count {
            Some(count) if self.config.validate_operand_indices && usize::from(index) >= count => {
                Err(malformed_error!(
                    "Argument index {} out of range, the method takes {} arguments",
                    index,
                    count
                ))
            }
            _ => Ok(index),
        }
    }
}

fn unexpected(token: Token, member: &LiveMember, expected: &str) -> Error {
    malformed_error!(
        "Token {} resolves to a {}, expected a {}",
        token,
        member.kind_name(),
        expected
    )
}

fn read_opcode(parser: &mut Parser) -> Result<&'static OpCode> {
    let first = parser.read_le::<u8>()?;
    let opcode = if first == FE_PREFIX {
        &INSTRUCTIONS_FE[usize::from(parser.read_le::<u8>()?)]
    } else {
        &INSTRUCTIONS[usize::from(first)]
    };

    if opcode.is_reserved() {
        return Err(malformed_error!("Reserved opcode: {:04X}", opcode.value()));
    }
    Ok(opcode)
}

/// Absolute target of a branch whose operand ends at the parser position.
fn branch_target(parser: &Parser, delta: i32) -> Result<u32> {
    let next = i64::try_from(parser.pos()).map_err(|_| Error::OutOfBounds)?;
    u32::try_from(next + i64::from(delta))
        .map_err(|_| malformed_error!("Branch target {} out of range", next + i64::from(delta)))
}

/// Instruction starting exactly at `target`.
///
/// # Errors
/// Returns [`Error::Malformed`] if no instruction starts at `target`.
pub fn resolve_offset(offsets: &[u32], target: u32) -> Result<InstructionId> {
    offsets
        .binary_search(&target)
        .map(InstructionId)
        .map_err(|_| malformed_error!("No instruction starts at offset IL_{:04x}", target))
}

/// Decode `il` into `body.instructions` with the given settings.
///
/// Argument indices are not validated, use [`BodyDecoder::with_argument_count`] for that.
///
/// # Errors
/// See [`BodyDecoder::decode`].
pub fn decode_body(
    il: &[u8],
    module: &LiveModuleRc,
    body: &mut MethodBody,
    importer: &mut ReferenceImporter,
    context: &ImportContext,
    config: &DecoderConfig,
) -> Result<()> {
    BodyDecoder::new(module, importer, context)
        .with_config(*config)
        .decode(il, body)
}

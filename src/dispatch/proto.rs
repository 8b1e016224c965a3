use nom::{
    branch::alt,
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, value, verify},
    error::ParseError,
    multi::{count, fold_many0},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharKind {
    Unsigned,
    Signed,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Int { signed: bool },
    Char(CharKind),
    CString,
    UniString,
    // class index, 'a' = 0
    Object(u32),
    Struct(Vec<Arg>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub is_ref: bool,
    pub pass_in: bool,
    pub pass_out: bool,
    pub non_null: bool,
    pub is_return: bool,
    pub array: bool,
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub flags: Flags,
    pub ty: ArgType,
}

/// A parsed glk prototype: the arguments the VM passes, and the value it gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    pub args: Vec<Arg>,
    pub ret: Option<Arg>,
}

impl Prototype {
    // arrays take an address and a length
    pub fn vm_arg_count(&self) -> u32 {
        self.args
            .iter()
            .map(|arg| if arg.flags.array { 2 } else { 1 })
            .sum()
    }
}

// from the recipes in the nom docs
fn ws<'a, F: 'a, O, E: ParseError<&'a str>>(
    inner: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |out: &str| out.parse::<usize>())(input)
}

fn flags(input: &str) -> IResult<&str, Flags> {
    fold_many0(one_of("<>&+:#!"), Flags::default, |mut flags, c| {
        match c {
            '<' => {
                flags.is_ref = true;
                flags.pass_out = true;
            }
            '>' => {
                flags.is_ref = true;
                flags.pass_in = true;
            }
            '&' => {
                flags.is_ref = true;
                flags.pass_in = true;
                flags.pass_out = true;
            }
            '+' => flags.non_null = true,
            ':' => {
                flags.is_ref = true;
                flags.pass_out = true;
                flags.non_null = true;
                flags.is_return = true;
            }
            '#' => flags.array = true,
            _ => flags.retained = true,
        }
        flags
    })(input)
}

fn char_kind(input: &str) -> IResult<&str, CharKind> {
    alt((
        value(CharKind::Unsigned, char('u')),
        value(CharKind::Signed, char('s')),
        value(CharKind::Native, char('n')),
    ))(input)
}

fn arg_type(input: &str) -> IResult<&str, ArgType> {
    alt((
        map(preceded(char('I'), one_of("us")), |c| ArgType::Int {
            signed: c == 's',
        }),
        map(preceded(char('C'), char_kind), ArgType::Char),
        value(ArgType::CString, char('S')),
        value(ArgType::UniString, char('U')),
        map(
            preceded(char('Q'), satisfy(|c| c.is_ascii_lowercase())),
            |c| ArgType::Object(c as u32 - 'a' as u32),
        ),
        map(delimited(char('['), arg_list, ws(char(']'))), ArgType::Struct),
    ))(input)
}

fn arg(input: &str) -> IResult<&str, Arg> {
    map(ws(pair(flags, arg_type)), |(flags, ty)| Arg { flags, ty })(input)
}

fn arg_list(input: &str) -> IResult<&str, Vec<Arg>> {
    let (input, n) = ws(number)(input)?;
    count(arg, n)(input)
}

// a return item may follow the counted items; a bare ':' marks a void result
fn prototype(input: &str) -> IResult<&str, (Vec<Arg>, Option<Arg>)> {
    terminated(
        pair(arg_list, opt(verify(arg, |a: &Arg| a.flags.is_return))),
        opt(ws(char(':'))),
    )(input)
}

pub fn parse_prototype(text: &str) -> Option<Prototype> {
    let (_, (mut args, extra)) = all_consuming(prototype)(text).ok()?;
    let mut returns = args.iter().filter(|a| a.flags.is_return).count();
    if extra.is_some() {
        returns += 1;
    }
    if returns > 1 {
        return None;
    }
    let ret = match args.iter().position(|a| a.flags.is_return) {
        Some(ix) => Some(args.remove(ix)),
        None => extra,
    };
    Some(Prototype { args, ret })
}

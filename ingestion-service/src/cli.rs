use anyhow::{bail, Context, Result};

/// Parse the optional positional `[year] [month]` arguments (program name excluded).
pub fn period_args<I, T>(args: I, usage: &str) -> Result<(Option<i32>, Option<u8>)>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let args: Vec<T> = args.into_iter().collect();
    match args.as_slice() {
        [] => Ok((None, None)),
        [year] => Ok((Some(parse_year(year.as_ref())?), None)),
        [year, month] => Ok((
            Some(parse_year(year.as_ref())?),
            Some(
                month
                    .as_ref()
                    .parse()
                    .with_context(|| format!("invalid month '{}'\n{usage}", month.as_ref()))?,
            ),
        )),
        _ => bail!("too many arguments\n{usage}"),
    }
}

fn parse_year(s: &str) -> Result<i32> {
    s.parse().with_context(|| format!("invalid year '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USAGE: &str = "usage: test [year] [month]";

    #[test]
    fn accepts_zero_one_or_two_arguments() {
        assert_eq!(period_args(Vec::<String>::new(), USAGE).unwrap(), (None, None));
        assert_eq!(period_args(["2023"], USAGE).unwrap(), (Some(2023), None));
        assert_eq!(period_args(["2024", "2"], USAGE).unwrap(), (Some(2024), Some(2)));
    }

    #[test]
    fn rejects_garbage_and_extra_arguments() {
        assert!(period_args(["last-year"], USAGE).is_err());
        assert!(period_args(["2024", "feb"], USAGE).is_err());
        assert!(period_args(["2024", "2", "1"], USAGE).is_err());
    }
}

use crate::backup::result_error::error::Error;
use crate::backup::result_error::{AddFunctionName, AddMsg};

pub type Result<T> = std::result::Result<T, Error>;

impl<R, S: Into<String>> AddMsg<S> for Result<R> {
    fn add_msg(self, msg: S) -> Self {
        self.map_err(|e| e.add_msg(msg))
    }
}

impl<R, S: Into<String>> AddFunctionName<S> for Result<R> {
    fn add_fn_name(self, fn_name: S) -> Self {
        self.map_err(|e| e.add_fn_name(fn_name))
    }
}

pub fn convert_error_vec(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_vec_empty_is_ok() {
        assert!(convert_error_vec(vec![]).is_ok());
    }

    #[test]
    fn test_convert_error_vec_keeps_all_errors() {
        let res = convert_error_vec(vec![
            Error::missing_field("target"),
            Error::missing_field("sources"),
        ]);
        match res {
            Err(Error::LotsOfError(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("Expected LotsOfError, got {other:?}"),
        }
    }

    #[test]
    fn test_result_add_msg_only_touches_err() {
        let ok: Result<u8> = Ok(1);
        assert_eq!(ok.add_msg("unused").unwrap(), 1);

        let err: Result<u8> = Err(Error::missing_field("target"));
        assert!(err.add_msg("loading job").unwrap_err().to_string().contains("loading job"));
    }
}
